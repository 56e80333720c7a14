//! Resumable single-file upload with backpressure and progress tracking.
//!
//! The [`UploadEngine`] drives one upload against a [`RemoteSession`]:
//! stat the destination, ask an [`OverwriteDecider`] when something is
//! already there, pick a start offset, then pipe chunks from a
//! [`LocalSource`] into the remote writer while reporting to a
//! [`ProgressSink`]. Every call ends in exactly one [`TransferOutcome`].

mod chunked;
mod engine;
mod progress;
mod session;
mod types;
mod validation;

#[cfg(test)]
mod mock;

pub use chunked::ChunkPipe;
pub use engine::{OverwriteDecider, ProgressSink, UploadEngine};
pub use progress::{SpeedTracker, format_speed};
pub use session::{LocalFile, LocalReader, LocalSource, RemoteSession, RemoteWriter};
pub use types::{
    ConflictDecision, RemoteFileState, TransferOutcome, TransferProgress, TransferRequest,
    TransferSummary, WriteMode,
};
pub use validation::{remote_dir_prefixes, remote_upload_path, validate_remote_path};

/// Default chunk size: 64 KiB.
///
/// Matches the SFTP write size most servers accept without splitting.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Number of chunks the reader task may run ahead of the remote writer.
pub const DEFAULT_PIPE_DEPTH: usize = 4;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("remote stat of {path} failed: {reason}")]
    Query { path: String, reason: String },

    #[error("overwrite decision failed: {0}")]
    Decision(String),

    #[error("remote file {0} already exists and no overwrite decider was supplied")]
    NoDecider(String),

    #[error("local {op} failed: {source}")]
    LocalIo {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("remote {op} failed: {source}")]
    RemoteIo {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot resume: remote holds {remote} bytes but local source has {local}")]
    ResumeBeyondSource { remote: u64, local: u64 },

    #[error("local source ended after {read} of {expected} bytes")]
    SourceTruncated { read: u64, expected: u64 },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl TransferError {
    /// Wraps a local filesystem error with the operation that failed.
    pub fn local(op: &'static str, source: std::io::Error) -> Self {
        Self::LocalIo { op, source }
    }

    /// Wraps a remote stream error with the operation that failed.
    pub fn remote(op: &'static str, source: std::io::Error) -> Self {
        Self::RemoteIo { op, source }
    }
}
