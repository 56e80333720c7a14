//! Signals that end the upload early but still let the temporary archive
//! be removed.

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Int,
    Term,
    Quit,
}

impl Interrupt {
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "SIGINT",
            Self::Term => "SIGTERM",
            Self::Quit => "SIGQUIT",
        }
    }

    /// 128 + signal number, as a shell reports it.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Int => 130,
            Self::Term => 143,
            Self::Quit => 131,
        }
    }
}

/// Resolves on Ctrl-C, and on unix also on SIGTERM or SIGQUIT.
///
/// Never resolves when no handler could be installed.
pub async fn interrupted() -> Interrupt {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
            (Ok(mut term), Ok(mut quit)) => tokio::select! {
                i = ctrl_c() => i,
                _ = term.recv() => Interrupt::Term,
                _ = quit.recv() => Interrupt::Quit,
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "cannot listen for SIGTERM/SIGQUIT");
                ctrl_c().await
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await
    }
}

async fn ctrl_c() -> Interrupt {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Interrupt::Int,
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending().await
        }
    }
}
