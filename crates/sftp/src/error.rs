//! Error types for the SFTP backend.

/// Errors produced while connecting to or talking to an SFTP server.
#[derive(Debug, thiserror::Error)]
pub enum SftpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("key error: {0}")]
    Key(#[from] russh_keys::Error),

    #[error("SFTP error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    #[error("authentication failed for {0}")]
    AuthFailed(String),

    #[error("no authentication method configured for {0}")]
    NoAuthMethod(String),

    #[error("connection to {0} timed out")]
    Timeout(String),

    #[error("{0} exists and is not a directory")]
    NotADirectory(String),
}

impl From<SftpError> for sshup_transfer::TransferError {
    fn from(e: SftpError) -> Self {
        Self::Connection(e.to_string())
    }
}
