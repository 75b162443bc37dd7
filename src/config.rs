//! Configuration loading, persistence and per-connect credentials.
//!
//! Two kinds of configuration live here:
//!
//! - [`Config`]: long-lived relay settings, read from `config.json` with
//!   environment variable overrides. The bearer token is never written to disk.
//! - [`SessionConfig`]: the operator's credentials for one connect attempt.
//!   It is validated, handed to the transport, then dropped (and zeroized).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_DETACH_KEY};

// ============================================================================
// Session credentials
// ============================================================================

/// Local validation failure for a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Host is empty or whitespace.
    MissingHost,
    /// Username is empty or whitespace.
    MissingUsername,
    /// Secret is empty or whitespace.
    MissingSecret,
}

impl ConfigError {
    /// Name of the offending field.
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            Self::MissingHost => "host",
            Self::MissingUsername => "username",
            Self::MissingSecret => "password",
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHost => write!(f, "Please enter a host address"),
            Self::MissingUsername => write!(f, "Please enter a username"),
            Self::MissingSecret => write!(f, "Please enter a password"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Credentials for a single connect attempt.
///
/// Memory is zeroed on drop. `Debug` never prints the secret or the token.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SessionConfig {
    /// Remote host, optionally `host:port`.
    pub host: String,
    /// Remote login name.
    pub username: String,
    /// Remote login password.
    pub secret: String,
    /// Bearer token for the relay. May be empty.
    pub token: String,
}

impl SessionConfig {
    /// Build credentials from owned parts.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            secret: secret.into(),
            token: token.into(),
        }
    }

    /// Check required fields and trim every field in place.
    ///
    /// Fields are checked in the order host, username, secret and the first
    /// missing one is reported. Nothing is modified when validation fails.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingUsername);
        }
        if self.secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }

        trim_in_place(&mut self.host);
        trim_in_place(&mut self.username);
        trim_in_place(&mut self.secret);
        trim_in_place(&mut self.token);
        Ok(())
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("has_secret", &!self.secret.is_empty())
            .field("has_token", &!self.token.is_empty())
            .finish()
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        let mut owned = trimmed.to_string();
        std::mem::swap(value, &mut owned);
        owned.zeroize();
    }
}

// ============================================================================
// Relay settings
// ============================================================================

/// How credentials travel to the relay.
///
/// `Frame` is the default and needs a relay that reads the `auth` frame.
/// Relays that only read `host`/`username`/`password`/`token` from the URL
/// query reject it; select `Query` for those.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Token in the `Authorization` header, credentials in a first `auth` frame.
    #[default]
    Frame,
    /// Everything as percent-encoded query parameters on the endpoint URL.
    Query,
}

impl AuthMode {
    /// Relay compatibility caveat for this mode, shown by `config`.
    pub fn compatibility_note(self) -> Option<&'static str> {
        match self {
            Self::Frame => Some(
                "auth_mode \"frame\" needs a relay that accepts the auth frame; \
                 set auth_mode to \"query\" (or pass --auth-mode query) for relays \
                 that read credentials from the URL query",
            ),
            Self::Query => None,
        }
    }
}

impl FromStr for AuthMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "frame" => Ok(Self::Frame),
            "query" => Ok(Self::Query),
            other => anyhow::bail!("unknown auth mode: {other} (expected frame or query)"),
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame => write!(f, "frame"),
            Self::Query => write!(f, "query"),
        }
    }
}

fn default_detach_key() -> u8 {
    DEFAULT_DETACH_KEY
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

/// Relay settings for the shell-relay CLI.
#[derive(Serialize, Deserialize, Clone)]
pub struct Config {
    /// Terminal endpoint of the relay (`ws://`, `wss://`, `http://` or `https://`).
    pub relay_url: String,
    /// Bearer token - NOT serialized to disk.
    #[serde(skip)]
    pub token: String,
    /// Credential transport.
    #[serde(default)]
    pub auth_mode: AuthMode,
    /// Additional fatal markers on top of the built-in set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_fatal_markers: Vec<String>,
    /// Byte that detaches the local terminal from the session.
    #[serde(default = "default_detach_key")]
    pub detach_key: u8,
    /// WebSocket handshake timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8080/api/terminal/ws".to_string(),
            token: String::new(),
            auth_mode: AuthMode::default(),
            extra_fatal_markers: Vec::new(),
            detach_key: DEFAULT_DETACH_KEY,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("relay_url", &self.relay_url)
            .field("has_token", &!self.token.is_empty())
            .field("auth_mode", &self.auth_mode)
            .field("extra_fatal_markers", &self.extra_fatal_markers)
            .field("detach_key", &self.detach_key)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `SHELL_RELAY_CONFIG_DIR` env var: explicit override
    /// 2. `SHELL_RELAY_ENV=test`: `<tmp>/shell-relay-test`
    /// 3. Default: platform config dir (Linux: ~/.config/shell-relay)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("SHELL_RELAY_CONFIG_DIR") {
            PathBuf::from(dir)
        } else if crate::env::is_test_mode() {
            std::env::temp_dir().join("shell-relay-test")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("shell-relay")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create config dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of the settings file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read settings from an explicit path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SHELL_RELAY_URL") {
            self.relay_url = url;
        }

        if let Ok(token) = std::env::var("SHELL_RELAY_TOKEN") {
            self.token = token;
        }

        if let Ok(mode) = std::env::var("SHELL_RELAY_AUTH_MODE") {
            match mode.parse() {
                Ok(mode) => self.auth_mode = mode,
                Err(e) => log::warn!("[config] ignoring SHELL_RELAY_AUTH_MODE: {e}"),
            }
        }

        if let Ok(timeout) = std::env::var("SHELL_RELAY_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.connect_timeout_secs = secs;
            }
        }
    }

    /// Persists the current configuration to the default path.
    /// The token is NOT saved.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Persists the current configuration to `path` with owner-only permissions.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Handshake timeout as a `Duration`. Zero falls back to the default.
    pub fn connect_timeout(&self) -> Duration {
        if self.connect_timeout_secs == 0 {
            DEFAULT_CONNECT_TIMEOUT
        } else {
            Duration::from_secs(self.connect_timeout_secs)
        }
    }

    /// Relay URL with an `http(s)` scheme rewritten to `ws(s)`.
    pub fn relay_ws_url(&self) -> String {
        crate::ws::http_to_ws_scheme(&self.relay_url)
    }
}
