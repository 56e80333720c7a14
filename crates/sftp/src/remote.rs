//! [`RemoteSession`] over russh-sftp.

use std::future::Future;
use std::io::{self, ErrorKind, SeekFrom};
use std::pin::Pin;

use russh::Disconnect;
use russh_sftp::client::error::Error as SftpProtocolError;
use russh_sftp::protocol::{OpenFlags, Status, StatusCode};
use sshup_transfer::{RemoteFileState, RemoteSession, RemoteWriter, TransferError, WriteMode};
use tokio::io::AsyncSeekExt;
use tracing::debug;

use crate::client::SftpSession;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) fn is_not_found(e: &SftpProtocolError) -> bool {
    matches!(
        e,
        SftpProtocolError::Status(Status {
            status_code: StatusCode::NoSuchFile,
            ..
        })
    )
}

/// Turns an SFTP failure into an `io::Error` with a meaningful kind.
fn to_io(e: SftpProtocolError) -> io::Error {
    let kind = match &e {
        SftpProtocolError::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => ErrorKind::NotFound,
            StatusCode::PermissionDenied => ErrorKind::PermissionDenied,
            StatusCode::NoConnection | StatusCode::ConnectionLost => ErrorKind::ConnectionAborted,
            _ => ErrorKind::Other,
        },
        SftpProtocolError::Timeout => ErrorKind::TimedOut,
        _ => ErrorKind::Other,
    };
    io::Error::new(kind, e)
}

fn open_flags(mode: WriteMode) -> OpenFlags {
    match mode {
        WriteMode::Truncate => OpenFlags::CREATE | OpenFlags::WRITE | OpenFlags::TRUNCATE,
        // No CREATE: a file that vanished since the stat must not be
        // recreated with a hole at the front.
        WriteMode::Append => OpenFlags::WRITE | OpenFlags::APPEND,
    }
}

impl RemoteSession for SftpSession {
    fn stat<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<RemoteFileState, TransferError>> {
        Box::pin(async move {
            match self.sftp.metadata(path).await {
                Ok(attrs) if attrs.is_dir() => Err(TransferError::Query {
                    path: path.to_string(),
                    reason: "is a directory".into(),
                }),
                Ok(attrs) => Ok(RemoteFileState::Exists {
                    size: attrs.size.unwrap_or(0),
                }),
                Err(e) if is_not_found(&e) => Ok(RemoteFileState::NotFound),
                Err(e) => Err(TransferError::Query {
                    path: path.to_string(),
                    reason: e.to_string(),
                }),
            }
        })
    }

    fn open_write<'a>(
        &'a self,
        path: &'a str,
        mode: WriteMode,
        offset: u64,
    ) -> BoxFuture<'a, Result<RemoteWriter, TransferError>> {
        Box::pin(async move {
            let mut file = self
                .sftp
                .open_with_flags(path, open_flags(mode))
                .await
                .map_err(|e| TransferError::remote("open", to_io(e)))?;

            if mode == WriteMode::Append && offset > 0 {
                file.seek(SeekFrom::Start(offset))
                    .await
                    .map_err(|e| TransferError::remote("seek", e))?;
            }
            debug!(path, ?mode, offset, "remote file opened");
            Ok(Box::new(file) as RemoteWriter)
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransferError>> {
        Box::pin(async move {
            self.handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
                .map_err(|e| TransferError::Connection(e.to_string()))?;
            debug!(server = %self.target(), "disconnected");
            Ok(())
        })
    }
}
