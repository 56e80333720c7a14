//! SFTP backend for the upload engine.
//!
//! Opens an SSH connection with russh, verifies the host key against
//! `~/.ssh/known_hosts`, authenticates, starts the `sftp` subsystem and
//! exposes it as a [`sshup_transfer::RemoteSession`].

mod client;
mod dirs;
mod error;
mod remote;

pub use client::{ConnectConfig, SftpSession};
pub use error::SftpError;

use std::time::Duration;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// How long to wait for TCP connect plus SSH handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
