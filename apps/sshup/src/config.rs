//! Server profiles.
//!
//! Read from `$SSHUP_CONFIG`, or `~/.config/sshup/config.json`
//! (`%APPDATA%\sshup\config.json` on Windows):
//!
//! ```json
//! { "servers": { "prod": { "host": "example.com", "username": "deploy" } } }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sshup_sftp::{ConnectConfig, DEFAULT_PORT};

/// Profile name that is built from `SSHUP_*` variables alone.
pub const ENV_PROFILE: &str = "env";

// ---------------------------------------------------------------------------
// ServerProfile
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Path to a private key; a leading `~/` is expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_dir: Option<String>,
    #[serde(default)]
    pub strict_host_keys: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ServerProfile {
    /// The configured `remote_dir`, or `/home/<username>/uploads/`.
    pub fn default_remote_dir(&self) -> String {
        match &self.remote_dir {
            Some(dir) if !dir.is_empty() => dir.clone(),
            _ => format!("/home/{}/uploads/", self.username),
        }
    }

    pub fn connect_config(&self) -> ConnectConfig {
        let mut cfg = ConnectConfig::new(&self.host, &self.username);
        cfg.port = self.port;
        cfg.password = self.password.clone();
        cfg.private_key = self.private_key.as_deref().map(expand_home);
        cfg.passphrase = self.passphrase.clone();
        cfg.strict_host_keys = self.strict_host_keys;
        cfg
    }
}

impl fmt::Debug for ServerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key", &self.private_key)
            .field("remote_dir", &self.remote_dir)
            .field("strict_host_keys", &self.strict_host_keys)
            .finish_non_exhaustive()
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let var = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";
    std::env::var_os(var).map(PathBuf::from)
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

/// `SSHUP_HOST`, `SSHUP_PORT`, `SSHUP_USER` and `SSHUP_PASSWORD`.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| get(key).filter(|v| !v.is_empty());
        let port = non_empty("SSHUP_PORT").and_then(|raw| match raw.parse() {
            Ok(port) => Some(port),
            Err(_) => {
                tracing::warn!(value = %raw, "ignoring invalid SSHUP_PORT");
                None
            }
        });
        Self {
            host: non_empty("SSHUP_HOST"),
            port,
            user: non_empty("SSHUP_USER"),
            password: non_empty("SSHUP_PASSWORD"),
        }
    }

    fn apply(&self, profile: &mut ServerProfile) {
        if let Some(host) = &self.host {
            profile.host = host.clone();
        }
        if let Some(port) = self.port {
            profile.port = port;
        }
        if let Some(user) = &self.user {
            profile.username = user.clone();
        }
        if let Some(password) = &self.password {
            profile.password = Some(password.clone());
        }
    }

    /// A profile made only of overrides; needs at least host and user.
    fn to_profile(&self) -> Option<ServerProfile> {
        Some(ServerProfile {
            host: self.host.clone()?,
            port: self.port.unwrap_or(DEFAULT_PORT),
            username: self.user.clone()?,
            password: self.password.clone(),
            private_key: None,
            passphrase: None,
            remote_dir: None,
            strict_host_keys: false,
        })
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    servers: BTreeMap<String, ServerProfile>,
}

impl AppConfig {
    /// Loads the config file. A missing file yields an empty server table.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        match serde_json::from_str::<Self>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, no servers loaded"
                );
                Ok(Self::default())
            }
        }
    }

    /// Looks up a profile and applies `SSHUP_*` overrides.
    pub fn server(&self, name: &str) -> Option<ServerProfile> {
        self.server_with(name, &EnvOverrides::from_env())
    }

    fn server_with(&self, name: &str, env: &EnvOverrides) -> Option<ServerProfile> {
        let mut profile = match self.servers.get(name) {
            Some(p) => p.clone(),
            None if name == ENV_PROFILE => return env.to_profile(),
            None => return None,
        };
        env.apply(&mut profile);
        Some(profile)
    }

    /// Profile names in sorted order.
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }
}

fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("SSHUP_CONFIG").filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    config_base_dir().join("sshup").join("config.json")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}
