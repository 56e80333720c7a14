use crate::TransferError;
use crate::session::LocalSource;

/// One upload: what to read, where to write it, and how many bytes to expect.
pub struct TransferRequest<'a> {
    /// Local resource to read from.
    pub source: &'a dyn LocalSource,
    /// Destination path on the remote host.
    pub remote_path: String,
    /// Byte count of `source`, fixed for the whole call.
    pub size_hint: u64,
}

impl<'a> TransferRequest<'a> {
    /// Builds a request taking the size hint from the source itself.
    pub fn new(source: &'a dyn LocalSource, remote_path: impl Into<String>) -> Self {
        Self {
            size_hint: source.size(),
            source,
            remote_path: remote_path.into(),
        }
    }
}

/// Result of a remote stat. Not-found is an ordinary state, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFileState {
    NotFound,
    Exists { size: u64 },
}

impl RemoteFileState {
    /// Returns `true` if the remote entry exists.
    pub fn exists(&self) -> bool {
        matches!(self, Self::Exists { .. })
    }

    /// Returns the reported size, if the entry exists.
    pub fn size(&self) -> Option<u64> {
        match self {
            Self::NotFound => None,
            Self::Exists { size } => Some(*size),
        }
    }
}

/// What to do with a destination that already holds data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    Overwrite,
    Resume,
    Cancel,
}

impl ConflictDecision {
    /// Maps a free-form answer to a decision.
    ///
    /// Accepts `1`/`overwrite`/`o` and `2`/`resume`/`r` (case-insensitive,
    /// surrounding whitespace ignored). Anything else is [`Cancel`](Self::Cancel)
    /// so an ambiguous answer never destroys remote data.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_ascii_lowercase().as_str() {
            "1" | "o" | "overwrite" => Self::Overwrite,
            "2" | "r" | "resume" => Self::Resume,
            _ => Self::Cancel,
        }
    }
}

/// How the remote file is opened for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create or truncate, write from byte 0.
    Truncate,
    /// Keep existing bytes, write after them.
    Append,
}

/// Cumulative progress of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// `floor(bytes_transferred / total_bytes * 100)`, 100 for an empty total.
    pub percent: u8,
}

impl TransferProgress {
    pub fn new(bytes_transferred: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            100
        } else {
            let scaled = u128::from(bytes_transferred) * 100 / u128::from(total_bytes);
            scaled.min(100) as u8
        };
        Self {
            bytes_transferred,
            total_bytes,
            percent,
        }
    }

    /// Returns `true` once every byte has been handed to the destination.
    pub fn is_complete(&self) -> bool {
        self.percent == 100
    }
}

/// Details of a completed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    /// Offset the upload started from (non-zero only for resumes).
    pub start_offset: u64,
    /// Bytes written during this call.
    pub bytes_sent: u64,
    /// Final size of the remote file.
    pub total_bytes: u64,
    pub mode: WriteMode,
}

/// Terminal state of one upload call.
#[derive(Debug)]
pub enum TransferOutcome {
    Completed(TransferSummary),
    Cancelled,
    Failed(TransferError),
}

impl TransferOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the failure cause, if any.
    pub fn error(&self) -> Option<&TransferError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}
