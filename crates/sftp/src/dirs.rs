//! Remote `mkdir -p`.

use std::future::Future;
use std::pin::Pin;

use russh_sftp::client::SftpSession as SftpChannel;
use sshup_transfer::remote_dir_prefixes;
use tracing::debug;

use crate::error::SftpError;
use crate::remote::is_not_found;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a remote path turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PathKind {
    Missing,
    Directory,
    Other,
}

/// The two directory primitives `create_dir_all` needs.
pub(crate) trait DirOps: Send + Sync {
    fn kind<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<PathKind, SftpError>>;
    fn mkdir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), SftpError>>;
}

impl DirOps for SftpChannel {
    fn kind<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<PathKind, SftpError>> {
        Box::pin(async move {
            match self.metadata(path).await {
                Ok(attrs) if attrs.is_dir() => Ok(PathKind::Directory),
                Ok(_) => Ok(PathKind::Other),
                Err(e) if is_not_found(&e) => Ok(PathKind::Missing),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), SftpError>> {
        Box::pin(async move { Ok(self.create_dir(path).await?) })
    }
}

/// Creates `dir` and every missing parent, leaving existing ones alone.
pub(crate) async fn create_dir_all(ops: &dyn DirOps, dir: &str) -> Result<(), SftpError> {
    for prefix in remote_dir_prefixes(dir) {
        match ops.kind(&prefix).await? {
            PathKind::Directory => {}
            PathKind::Other => return Err(SftpError::NotADirectory(prefix)),
            PathKind::Missing => {
                ops.mkdir(&prefix).await?;
                debug!(path = %prefix, "created remote directory");
            }
        }
    }
    Ok(())
}
