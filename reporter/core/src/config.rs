//! Reporter Configuration
//!
//! Layered configuration for the report connection. Priority, lowest first:
//!
//! 1. Built-in defaults
//! 2. TOML file (`~/.config/reporter/reporter.toml` or an explicit path)
//! 3. Environment variables
//! 4. Command-line overrides ([`ConfigOverrides`])
//!
//! # File Format
//!
//! ```toml
//! [connection]
//! socket_path = "/run/collector/collector.sock"
//! key = 1
//! connect_timeout_ms = 1000
//! io_timeout_ms = 500
//! send_attempts = 10
//! send_retry_interval_ms = 10
//! ```
//!
//! # Environment Variables
//!
//! - `REPORTER_SOCKET`: Path to the collector socket
//! - `REPORTER_KEY`: Connection key
//! - `REPORTER_CONNECT_TIMEOUT`: Connect timeout in ms
//! - `REPORTER_IO_TIMEOUT`: Send/receive timeout in ms
//! - `REPORTER_SEND_ATTEMPTS`: Send attempts per write
//! - `REPORTER_SEND_RETRY_INTERVAL`: Pause between send attempts in ms

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::{
    default_socket_path, ConnKey, Connection, SendPolicy, DEFAULT_SEND_ATTEMPTS,
};

/// Longest accepted pause between send attempts
pub const MAX_SEND_RETRY_INTERVAL_MS: u64 = 1000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Where the effective configuration came from
///
/// Ordered by priority: a later layer that changes anything wins the label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    /// Built-in defaults only
    #[default]
    Default,
    /// Values from a TOML file
    File,
    /// Values from environment variables
    Env,
    /// Values from command-line flags
    Cli,
}

/// Settings for one report connection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Collector socket path (None = [`default_socket_path`])
    pub socket_path: Option<PathBuf>,

    /// Connection key used for log correlation
    pub key: ConnKey,

    /// Connect timeout in milliseconds (0 = no timeout)
    pub connect_timeout_ms: u64,

    /// Steady-state send/receive timeout in milliseconds (0 = no timeout)
    pub io_timeout_ms: u64,

    /// Send attempts per write
    pub send_attempts: u32,

    /// Pause between send attempts in milliseconds
    pub send_retry_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            key: 1,
            connect_timeout_ms: 1000,
            io_timeout_ms: 500,
            send_attempts: DEFAULT_SEND_ATTEMPTS,
            send_retry_interval_ms: 10,
        }
    }
}

impl ConnectionConfig {
    /// Effective socket path
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path.clone().unwrap_or_else(default_socket_path)
    }

    /// Connect timeout as a duration
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Send/receive timeout as a duration
    #[must_use]
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Send retry budget
    #[must_use]
    pub fn send_policy(&self) -> SendPolicy {
        SendPolicy::new(
            self.send_attempts,
            Duration::from_millis(self.send_retry_interval_ms),
        )
    }

    /// Build an unstarted connection from these settings
    #[must_use]
    pub fn connection(&self) -> Connection {
        Connection::with_policy(self.key, self.socket_path(), self.send_policy())
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero send budget or a retry
    /// interval above [`MAX_SEND_RETRY_INTERVAL_MS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.send_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "send_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.send_retry_interval_ms > MAX_SEND_RETRY_INTERVAL_MS {
            return Err(ConfigError::Invalid {
                field: "send_retry_interval_ms",
                reason: format!(
                    "{} exceeds the maximum of {MAX_SEND_RETRY_INTERVAL_MS}",
                    self.send_retry_interval_ms
                ),
            });
        }
        if let Some(path) = &self.socket_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "socket_path",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// On-disk layout of the config file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReporterToml {
    /// `[connection]` table
    pub connection: ConnectionConfig,
}

/// Resolved configuration plus its provenance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReporterConfig {
    /// Connection settings
    pub connection: ConnectionConfig,
    source: ConfigSource,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            source: ConfigSource::Default,
        }
    }
}

impl ReporterConfig {
    /// Highest-priority layer that contributed a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    fn mark(&mut self, source: ConfigSource) {
        self.source = self.source.max(source);
    }

    /// Apply `REPORTER_*` environment variables
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self) {
        let conn = &mut self.connection;
        let mut changed = false;

        if let Some(path) = std::env::var_os("REPORTER_SOCKET") {
            conn.socket_path = Some(PathBuf::from(path));
            changed = true;
        }
        changed |= env_value("REPORTER_KEY", &mut conn.key);
        changed |= env_value("REPORTER_CONNECT_TIMEOUT", &mut conn.connect_timeout_ms);
        changed |= env_value("REPORTER_IO_TIMEOUT", &mut conn.io_timeout_ms);
        changed |= env_value("REPORTER_SEND_ATTEMPTS", &mut conn.send_attempts);
        changed |= env_value(
            "REPORTER_SEND_RETRY_INTERVAL",
            &mut conn.send_retry_interval_ms,
        );

        if changed {
            self.mark(ConfigSource::Env);
        }
    }
}

fn env_value<T: std::str::FromStr>(name: &str, slot: &mut T) -> bool {
    let Ok(raw) = std::env::var(name) else {
        return false;
    };
    match raw.trim().parse() {
        Ok(value) => {
            *slot = value;
            true
        }
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring unparseable environment variable");
            false
        }
    }
}

/// Command-line overrides, applied last
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Socket path override
    pub socket_path: Option<PathBuf>,
    /// Key override
    pub key: Option<ConnKey>,
    /// Connect timeout override (ms)
    pub connect_timeout_ms: Option<u64>,
    /// I/O timeout override (ms)
    pub io_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// No overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the socket path
    #[must_use]
    pub fn with_socket_path(mut self, path: PathBuf) -> Self {
        self.socket_path = Some(path);
        self
    }

    /// Override the key
    #[must_use]
    pub fn with_key(mut self, key: ConnKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Override the connect timeout
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Override the I/O timeout
    #[must_use]
    pub fn with_io_timeout_ms(mut self, ms: u64) -> Self {
        self.io_timeout_ms = Some(ms);
        self
    }

    /// True when no override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the overrides to a resolved config
    pub fn apply(&self, config: &mut ReporterConfig) {
        if self.is_empty() {
            return;
        }
        let conn = &mut config.connection;
        if let Some(path) = &self.socket_path {
            conn.socket_path = Some(path.clone());
        }
        if let Some(key) = self.key {
            conn.key = key;
        }
        if let Some(ms) = self.connect_timeout_ms {
            conn.connect_timeout_ms = ms;
        }
        if let Some(ms) = self.io_timeout_ms {
            conn.io_timeout_ms = ms;
        }
        config.mark(ConfigSource::Cli);
    }
}

/// Default config file location
///
/// `$XDG_CONFIG_HOME/reporter/reporter.toml` (or the platform equivalent).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reporter").join("reporter.toml"))
}

/// Parse a config file's contents
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed or has unknown keys.
pub fn parse_config(path: &Path, contents: &str) -> Result<ReporterToml, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load configuration from `path`, or the default location when `None`
///
/// A missing file is not an error; defaults are used. Environment variables
/// are applied on top and the result is validated.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or if the
/// resulting values are invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ReporterConfig, ConfigError> {
    let mut config = ReporterConfig::default();

    if let Some(path) = path.or_else(default_config_path) {
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let file = parse_config(&path, &contents)?;
                config.connection = file.connection;
                config.mark(ConfigSource::File);
                tracing::debug!(path = ?path, "Loaded config file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = ?path, "No config file, using defaults");
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        }
    }

    config.apply_env();
    config.connection.validate()?;
    Ok(config)
}

/// Load configuration from the default location
///
/// # Errors
///
/// See [`load_config_from_path`].
pub fn load_config() -> Result<ReporterConfig, ConfigError> {
    load_config_from_path(None)
}
