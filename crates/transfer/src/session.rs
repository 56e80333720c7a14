//! Collaborator seams: the remote file session and the local byte source.
//!
//! Both traits return boxed futures so they stay object-safe; the engine
//! holds them as `&dyn` and tests substitute in-memory mocks.

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite};
use tracing::debug;

use crate::TransferError;
use crate::types::{RemoteFileState, WriteMode};

/// Readable stream over a local source, positioned at the requested offset.
pub type LocalReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable stream into a remote file.
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A connected remote file session.
///
/// Implementations are created already connected (their constructor is the
/// `connect` step) and must be usable for one upload at a time.
pub trait RemoteSession: Send + Sync {
    /// Stats `path`. A missing entry is `Ok(RemoteFileState::NotFound)`.
    fn stat<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<RemoteFileState, TransferError>>;

    /// Opens `path` for writing.
    ///
    /// With [`WriteMode::Truncate`] the file is created or emptied and
    /// `offset` is 0. With [`WriteMode::Append`] existing bytes are kept
    /// and writing continues at `offset`.
    fn open_write<'a>(
        &'a self,
        path: &'a str,
        mode: WriteMode,
        offset: u64,
    ) -> BoxFuture<'a, Result<RemoteWriter, TransferError>>;

    /// Closes the session.
    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransferError>>;
}

/// A sized local resource that can be read from an arbitrary offset.
pub trait LocalSource: Send + Sync {
    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Opens a fresh reader starting at `offset`.
    ///
    /// Readers are not restartable; call again for a new offset.
    fn open_at(&self, offset: u64) -> BoxFuture<'_, Result<LocalReader, TransferError>>;
}

// ---------------------------------------------------------------------------
// LocalFile
// ---------------------------------------------------------------------------

/// A regular file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    size: u64,
}

impl LocalFile {
    /// Stats `path` and captures its size.
    ///
    /// Directories are rejected; archive them first.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| TransferError::local("stat", e))?;

        if !metadata.is_file() {
            return Err(TransferError::InvalidPath(format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        Ok(Self {
            size: metadata.len(),
            path,
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalSource for LocalFile {
    fn size(&self) -> u64 {
        self.size
    }

    fn open_at(&self, offset: u64) -> BoxFuture<'_, Result<LocalReader, TransferError>> {
        Box::pin(async move {
            let mut file = tokio::fs::File::open(&self.path)
                .await
                .map_err(|e| TransferError::local("open", e))?;
            if offset > 0 {
                file.seek(SeekFrom::Start(offset))
                    .await
                    .map_err(|e| TransferError::local("seek", e))?;
            }
            debug!(path = %self.path.display(), offset, "local file opened");
            Ok(Box::new(file) as LocalReader)
        })
    }
}
