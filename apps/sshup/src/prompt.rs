//! Interactive overwrite/resume prompt.

use std::future::Future;
use std::io;
use std::pin::Pin;

use sshup_transfer::{ConflictDecision, OverwriteDecider, TransferError};
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::{Mutex, oneshot};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub fn prompt_text(remote_path: &str) -> String {
    format!(
        "File \"{remote_path}\" already exists.\n\
         Choose an option:\n\
         1) Overwrite\n\
         2) Resume\n\
         3) Cancel\n\
         Your choice (1-3): "
    )
}

// ---------------------------------------------------------------------------
// Line sources
// ---------------------------------------------------------------------------

/// Yields one answer line per call; `None` at end of input.
pub trait LineSource: Send {
    fn next_line(&mut self) -> BoxFuture<'_, io::Result<Option<String>>>;
}

/// Lines from the process stdin, read on a detached OS thread.
///
/// tokio's stdin blocks runtime shutdown until the pending read returns;
/// a plain thread does not, so Ctrl-C at the prompt exits immediately.
pub struct StdinLines;

impl LineSource for StdinLines {
    fn next_line(&mut self) -> BoxFuture<'_, io::Result<Option<String>>> {
        let answer = read_on_thread(|| {
            let mut line = String::new();
            let n = io::stdin().read_line(&mut line)?;
            Ok((n > 0).then_some(line))
        });
        Box::pin(answer)
    }
}

/// Runs a blocking read on its own thread and hands the result back.
///
/// Dropping the returned future abandons the thread; it ends with the process.
fn read_on_thread<F>(
    read: F,
) -> impl Future<Output = io::Result<Option<String>>> + Send + 'static
where
    F: FnOnce() -> io::Result<Option<String>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name("sshup-stdin".into())
        .spawn(move || {
            let _ = tx.send(read());
        });
    async move {
        spawned?;
        rx.await
            .map_err(|_| io::Error::other("stdin reader thread exited"))?
    }
}

// ---------------------------------------------------------------------------
// PromptDecider
// ---------------------------------------------------------------------------

/// Asks on a line-oriented terminal. End of input counts as Cancel.
pub struct PromptDecider<L, W> {
    io: Mutex<(L, W)>,
}

impl PromptDecider<StdinLines, Stdout> {
    pub fn stdio() -> Self {
        Self::new(StdinLines, tokio::io::stdout())
    }
}

impl<L, W> PromptDecider<L, W> {
    pub fn new(input: L, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> (L, W) {
        self.io.into_inner()
    }
}

impl<L, W> OverwriteDecider for PromptDecider<L, W>
where
    L: LineSource,
    W: AsyncWrite + Unpin + Send,
{
    fn decide<'a>(
        &'a self,
        remote_path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ConflictDecision, TransferError>> + Send + 'a>> {
        Box::pin(async move {
            let mut guard = self.io.lock().await;
            let (input, output) = &mut *guard;
            let io_err = |e: io::Error| TransferError::Decision(e.to_string());

            output
                .write_all(prompt_text(remote_path).as_bytes())
                .await
                .map_err(io_err)?;
            output.flush().await.map_err(io_err)?;

            match input.next_line().await.map_err(io_err)? {
                Some(line) => Ok(ConflictDecision::from_answer(line.trim())),
                None => {
                    tracing::debug!("prompt input closed");
                    Ok(ConflictDecision::Cancel)
                }
            }
        })
    }
}
