//! The resumable upload engine.
//!
//! One call to [`UploadEngine::upload`] runs the whole pipeline:
//!
//! 1. **Stat** the destination
//! 2. **Decide** overwrite / resume / cancel when it already exists
//! 3. **Open** the local reader at the start offset and the remote writer
//!    in truncate or append mode
//! 4. **Copy** chunks through a bounded [`ChunkPipe`], awaiting every write
//! 5. **Report** percent and speed after each chunk
//! 6. **Close** both sides and return a [`TransferOutcome`]

use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::chunked::ChunkPipe;
use crate::progress::SpeedTracker;
use crate::session::{RemoteSession, RemoteWriter};
use crate::types::{
    ConflictDecision, RemoteFileState, TransferOutcome, TransferProgress, TransferRequest,
    TransferSummary, WriteMode,
};
use crate::validation::validate_remote_path;
use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_PIPE_DEPTH, TransferError};

/// Receives progress notifications.
///
/// Called on the upload task between chunk writes; a slow sink slows the
/// transfer down.
pub trait ProgressSink: Send + Sync {
    /// `speed` is `None` exactly once, on the final call at 100 percent,
    /// which is only made after the remote file was closed successfully.
    fn on_progress(&self, progress: TransferProgress, speed: Option<&str>);
}

/// Chooses what to do with a destination that already exists.
pub trait OverwriteDecider: Send + Sync {
    fn decide<'a>(
        &'a self,
        remote_path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ConflictDecision, TransferError>> + Send + 'a>>;
}

/// Drives resumable single-file uploads.
#[derive(Debug, Clone)]
pub struct UploadEngine {
    chunk_size: usize,
    pipe_depth: usize,
}

impl Default for UploadEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadEngine {
    /// Creates an engine with [`DEFAULT_CHUNK_SIZE`] and [`DEFAULT_PIPE_DEPTH`].
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pipe_depth: DEFAULT_PIPE_DEPTH,
        }
    }

    /// Sets the chunk size. 0 keeps the default.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    /// Sets how many chunks may be read ahead of the remote writer. 0 keeps the default.
    pub fn with_pipe_depth(mut self, pipe_depth: usize) -> Self {
        if pipe_depth > 0 {
            self.pipe_depth = pipe_depth;
        }
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Uploads `request.source` to `request.remote_path`.
    ///
    /// The session is borrowed mutably so a single session never carries two
    /// uploads at once. Always returns one terminal outcome; by the time it
    /// returns the local reader has been released and the remote writer shut
    /// down.
    pub async fn upload(
        &self,
        session: &mut dyn RemoteSession,
        request: TransferRequest<'_>,
        progress: Option<&dyn ProgressSink>,
        decider: Option<&dyn OverwriteDecider>,
    ) -> TransferOutcome {
        let path = request.remote_path.clone();
        match self.run(&*session, &request, progress, decider).await {
            Ok(Some(summary)) => {
                info!(
                    path = %path,
                    start_offset = summary.start_offset,
                    bytes_sent = summary.bytes_sent,
                    total_bytes = summary.total_bytes,
                    "upload completed"
                );
                TransferOutcome::Completed(summary)
            }
            Ok(None) => {
                info!(path = %path, "upload cancelled");
                TransferOutcome::Cancelled
            }
            Err(e) => {
                error!(path = %path, error = %e, "upload failed");
                TransferOutcome::Failed(e)
            }
        }
    }

    /// `Ok(None)` means the decider cancelled.
    async fn run(
        &self,
        session: &dyn RemoteSession,
        request: &TransferRequest<'_>,
        progress: Option<&dyn ProgressSink>,
        decider: Option<&dyn OverwriteDecider>,
    ) -> Result<Option<TransferSummary>, TransferError> {
        let path = request.remote_path.as_str();
        let total = request.size_hint;
        validate_remote_path(path)?;

        // 1. Existence check.
        let state = session.stat(path).await?;
        debug!(path = %path, ?state, "remote stat");

        // 2 + 3. Conflict resolution and start offset.
        let Some((mode, start_offset)) = resolve_start(path, state, total, decider).await? else {
            return Ok(None);
        };

        // 4. Open both sides. Local first so a bad source never truncates the remote.
        let reader = request.source.open_at(start_offset).await?;
        let mut writer = session.open_write(path, mode, start_offset).await?;

        info!(
            path = %path,
            ?mode,
            start_offset,
            total_bytes = total,
            "upload started"
        );

        let mut pipe = ChunkPipe::spawn(
            reader,
            total - start_offset,
            self.chunk_size,
            self.pipe_depth,
        );
        let mut reporter = Reporter::new(progress, start_offset, total);

        let copied = copy(&mut pipe, &mut writer, start_offset, total, &mut reporter).await;

        // 6. Release both sides whichever way the copy ended.
        pipe.close().await;
        let closed = writer.shutdown().await;
        drop(writer);

        let transferred = match copied {
            Ok(n) => n,
            Err(e) => {
                if let Err(close_err) = closed {
                    debug!(path = %path, error = %close_err, "remote close after failure");
                }
                return Err(e);
            }
        };
        closed.map_err(|e| TransferError::remote("close", e))?;

        reporter.finish();

        Ok(Some(TransferSummary {
            start_offset,
            bytes_sent: transferred - start_offset,
            total_bytes: transferred,
            mode,
        }))
    }
}

/// Maps the remote state (and, when needed, the decider's answer) to a write
/// mode and start offset. `None` means cancel.
async fn resolve_start(
    path: &str,
    state: RemoteFileState,
    total: u64,
    decider: Option<&dyn OverwriteDecider>,
) -> Result<Option<(WriteMode, u64)>, TransferError> {
    let size = match state {
        RemoteFileState::NotFound => return Ok(Some((WriteMode::Truncate, 0))),
        RemoteFileState::Exists { size } => size,
    };

    let Some(decider) = decider else {
        return Err(TransferError::NoDecider(path.to_string()));
    };

    let decision = match decider.decide(path).await {
        Ok(decision) => decision,
        Err(e) => {
            warn!(path = %path, error = %e, "overwrite decider failed, cancelling");
            ConflictDecision::Cancel
        }
    };
    debug!(path = %path, remote_size = size, ?decision, "conflict resolved");

    match decision {
        ConflictDecision::Overwrite => Ok(Some((WriteMode::Truncate, 0))),
        ConflictDecision::Resume if size > total => Err(TransferError::ResumeBeyondSource {
            remote: size,
            local: total,
        }),
        ConflictDecision::Resume => Ok(Some((WriteMode::Append, size))),
        ConflictDecision::Cancel => Ok(None),
    }
}

/// Pumps chunks from the pipe into the writer. Returns the final byte count.
async fn copy(
    pipe: &mut ChunkPipe,
    writer: &mut RemoteWriter,
    start_offset: u64,
    total: u64,
    reporter: &mut Reporter<'_>,
) -> Result<u64, TransferError> {
    let mut transferred = start_offset;

    while let Some(chunk) = pipe.next_chunk().await {
        let chunk = chunk.map_err(|e| TransferError::local("read", e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::remote("write", e))?;

        // 5. Progress accounting.
        transferred += chunk.len() as u64;
        reporter.advance(transferred);
    }

    if transferred != total {
        return Err(TransferError::SourceTruncated {
            read: transferred,
            expected: total,
        });
    }
    Ok(transferred)
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Feeds the speed tracker and forwards strictly increasing percentages.
struct Reporter<'a> {
    sink: Option<&'a dyn ProgressSink>,
    tracker: SpeedTracker,
    total: u64,
    last_percent: Option<u8>,
}

impl<'a> Reporter<'a> {
    fn new(sink: Option<&'a dyn ProgressSink>, start_offset: u64, total: u64) -> Self {
        Self {
            sink,
            tracker: SpeedTracker::with_baseline(start_offset),
            total,
            last_percent: None,
        }
    }

    fn advance(&mut self, transferred: u64) {
        let progress = TransferProgress::new(transferred, self.total);
        let speed = self.tracker.observe(transferred);

        // 100 waits for `finish`, once the remote side has acknowledged the close.
        if progress.is_complete() {
            return;
        }
        if self.last_percent.is_some_and(|last| progress.percent <= last) {
            return;
        }
        self.last_percent = Some(progress.percent);

        if let Some(sink) = self.sink {
            sink.on_progress(progress, Some(speed));
        }
    }

    /// Emits the single terminal 100 percent call.
    fn finish(&mut self) {
        if self.last_percent == Some(100) {
            return;
        }
        self.last_percent = Some(100);
        if let Some(sink) = self.sink {
            sink.on_progress(TransferProgress::new(self.total, self.total), None);
        }
    }
}
