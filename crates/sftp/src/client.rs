//! SSH connection setup: host key check, authentication, subsystem start.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh_keys::key;
use russh_sftp::client::SftpSession as SftpChannel;
use tracing::{debug, error, info, warn};

use crate::dirs;
use crate::error::SftpError;
use crate::{CONNECT_TIMEOUT, DEFAULT_PORT};

/// SSH keepalive / idle limit for the underlying connection.
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// ConnectConfig
// ---------------------------------------------------------------------------

/// Everything needed to reach and log into one server.
#[derive(Clone)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
    pub passphrase: Option<String>,
    /// Reject hosts missing from `known_hosts` instead of accepting them
    /// with a warning. Changed keys are always rejected.
    pub strict_host_keys: bool,
    pub timeout: Duration,
}

impl ConnectConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: None,
            private_key: None,
            passphrase: None,
            strict_host_keys: false,
            timeout: CONNECT_TIMEOUT,
        }
    }

    /// `user@host:port`, used in logs and error messages.
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    pub fn has_auth(&self) -> bool {
        self.password.is_some() || self.private_key.is_some()
    }
}

impl fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key", &self.private_key)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("strict_host_keys", &self.strict_host_keys)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Host key verification
// ---------------------------------------------------------------------------

pub(crate) struct HostKeyCheck {
    host: String,
    port: u16,
    strict: bool,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        let known = russh_keys::check_known_hosts(&self.host, self.port, server_public_key);
        let accept = host_key_verdict(&known, self.strict);
        match (&known, accept) {
            (Ok(true), _) => debug!(host = %self.host, "host key matches known_hosts"),
            (Err(russh_keys::Error::KeyChanged { line }), _) => error!(
                host = %self.host,
                line,
                %fingerprint,
                "host key does not match known_hosts; refusing to connect"
            ),
            (_, true) => warn!(
                host = %self.host,
                %fingerprint,
                "host not in known_hosts; accepting key"
            ),
            (_, false) => warn!(
                host = %self.host,
                %fingerprint,
                "host not in known_hosts; rejecting key"
            ),
        }
        Ok(accept)
    }
}

/// Decides whether to trust a server key given the `known_hosts` lookup.
fn host_key_verdict(known: &Result<bool, russh_keys::Error>, strict: bool) -> bool {
    match known {
        Ok(true) => true,
        Err(russh_keys::Error::KeyChanged { .. }) => false,
        // Unknown host, or known_hosts unreadable.
        Ok(false) | Err(_) => !strict,
    }
}

// ---------------------------------------------------------------------------
// SftpSession
// ---------------------------------------------------------------------------

/// An authenticated SSH connection with a running `sftp` subsystem.
pub struct SftpSession {
    pub(crate) handle: client::Handle<HostKeyCheck>,
    pub(crate) sftp: SftpChannel,
    target: String,
}

impl SftpSession {
    /// Connects, authenticates and starts SFTP within `config.timeout`.
    pub async fn connect(config: &ConnectConfig) -> Result<Self, SftpError> {
        let target = config.target();
        if !config.has_auth() {
            return Err(SftpError::NoAuthMethod(target));
        }
        match tokio::time::timeout(config.timeout, establish(config, target.clone())).await {
            Ok(result) => result,
            Err(_) => Err(SftpError::Timeout(target)),
        }
    }

    /// `mkdir -p` on the server.
    pub async fn create_dir_all(&self, dir: &str) -> Result<(), SftpError> {
        dirs::create_dir_all(&self.sftp, dir).await
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

async fn establish(config: &ConnectConfig, target: String) -> Result<SftpSession, SftpError> {
    let ssh_config = Arc::new(client::Config {
        inactivity_timeout: Some(INACTIVITY_TIMEOUT),
        ..Default::default()
    });
    let handler = HostKeyCheck {
        host: config.host.clone(),
        port: config.port,
        strict: config.strict_host_keys,
    };

    let mut handle =
        client::connect(ssh_config, (config.host.as_str(), config.port), handler).await?;
    debug!(server = %target, "SSH handshake complete");

    authenticate(&mut handle, config, &target).await?;

    let channel = handle.channel_open_session().await?;
    channel.request_subsystem(true, "sftp").await?;
    let sftp = SftpChannel::new(channel.into_stream()).await?;

    info!(server = %target, "SFTP session ready");
    Ok(SftpSession {
        handle,
        sftp,
        target,
    })
}

/// Tries the private key first, then the password.
async fn authenticate(
    handle: &mut client::Handle<HostKeyCheck>,
    config: &ConnectConfig,
    target: &str,
) -> Result<(), SftpError> {
    if let Some(path) = &config.private_key {
        match russh_keys::load_secret_key(path, config.passphrase.as_deref()) {
            Ok(key) => {
                if handle
                    .authenticate_publickey(config.username.as_str(), Arc::new(key))
                    .await?
                {
                    debug!(server = %target, key = %path.display(), "authenticated with public key");
                    return Ok(());
                }
                debug!(server = %target, "public key rejected by server");
            }
            Err(e) if config.password.is_some() => {
                warn!(key = %path.display(), error = %e, "cannot load private key; trying password");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(password) = &config.password
        && handle
            .authenticate_password(config.username.as_str(), password.as_str())
            .await?
    {
        debug!(server = %target, "authenticated with password");
        return Ok(());
    }

    Err(SftpError::AuthFailed(target.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_uses_defaults() {
        let cfg = ConnectConfig::new("srv.example", "deploy");
        assert_eq!(cfg.port, 22);
        assert_eq!(cfg.timeout, CONNECT_TIMEOUT);
        assert!(!cfg.strict_host_keys);
        assert!(!cfg.has_auth());
        assert_eq!(cfg.target(), "deploy@srv.example:22");
    }

    #[test]
    fn debug_hides_secrets() {
        let mut cfg = ConnectConfig::new("srv", "u");
        cfg.password = Some("hunter2".into());
        cfg.passphrase = Some("s3cret".into());
        let printed = format!("{cfg:?}");
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn known_key_is_accepted() {
        assert!(host_key_verdict(&Ok(true), true));
        assert!(host_key_verdict(&Ok(true), false));
    }

    #[test]
    fn changed_key_is_always_rejected() {
        let changed = Err(russh_keys::Error::KeyChanged { line: 3 });
        assert!(!host_key_verdict(&changed, false));
        assert!(!host_key_verdict(&changed, true));
    }

    #[test]
    fn unknown_host_depends_on_strictness() {
        assert!(host_key_verdict(&Ok(false), false));
        assert!(!host_key_verdict(&Ok(false), true));
    }

    #[tokio::test]
    async fn connect_without_credentials_fails_fast() {
        let cfg = ConnectConfig::new("127.0.0.1", "nobody");
        let err = SftpSession::connect(&cfg).await.err().unwrap();
        assert!(matches!(err, SftpError::NoAuthMethod(_)));
    }
}
