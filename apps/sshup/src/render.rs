//! Terminal progress bar.

use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sshup_transfer::{ProgressSink, TransferProgress};

const BAR_TEMPLATE: &str = "[{bar:30}] {pos}% {msg}";

/// Renders `[██████░░░░] 42% 1.46 MB/s` on stdout.
pub struct TerminalProgress {
    bar: ProgressBar,
    completed: AtomicBool,
}

impl TerminalProgress {
    pub fn stdout() -> Self {
        Self::with_target(ProgressDrawTarget::stdout())
    }

    pub fn with_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(100), target);
        match ProgressStyle::with_template(BAR_TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("█░")),
            Err(e) => tracing::debug!(error = %e, "progress template rejected"),
        }
        Self {
            bar,
            completed: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Leaves the bar where it stopped, e.g. after a failure.
    pub fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

impl ProgressSink for TerminalProgress {
    fn on_progress(&self, progress: TransferProgress, speed: Option<&str>) {
        self.bar.set_position(u64::from(progress.percent));
        if let Some(speed) = speed {
            self.bar.set_message(speed.to_string());
        }
        if progress.is_complete() && !self.completed.swap(true, Ordering::SeqCst) {
            self.bar.finish();
            println!("Upload completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden() -> TerminalProgress {
        TerminalProgress::with_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn tracks_percent_and_speed() {
        let p = hidden();
        p.on_progress(TransferProgress::new(42, 100), Some("1.46 MB/s"));
        assert_eq!(p.bar.position(), 42);
        assert_eq!(p.bar.message(), "1.46 MB/s");
        assert!(!p.is_completed());
    }

    #[test]
    fn final_call_keeps_last_speed_and_finishes() {
        let p = hidden();
        p.on_progress(TransferProgress::new(50, 100), Some("2.00 KB/s"));
        p.on_progress(TransferProgress::new(100, 100), None);
        assert_eq!(p.bar.position(), 100);
        assert_eq!(p.bar.message(), "2.00 KB/s");
        assert!(p.bar.is_finished());
        assert!(p.is_completed());
    }

    #[test]
    fn abandon_stops_an_unfinished_bar() {
        let p = hidden();
        p.on_progress(TransferProgress::new(10, 100), Some("0 B/s"));
        p.abandon();
        assert!(p.bar.is_finished());
        assert!(!p.is_completed());
    }
}
