//! Daemon configuration.
//!
//! A single YAML file, located through `--config` or `SPLITD_CONF_FILE`.
//! Every field has a default, so an empty file (or no file at all) yields a
//! working daemon listening on the default socket.
//!
//! ```yaml
//! link:
//!   socket_path: /var/run/splitd.sock
//!   flavor: unix-seqpacket
//!   max_connections: 1024
//! sdk:
//!   rules_file: /etc/splitd/flags.yaml
//!   impressions_queue_size: 8192
//!   impressions_refresh_secs: 30
//! recorder:
//!   url: https://events.example.com/api
//!   api_key: sdk-key
//! logging:
//!   level: info
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use splitd_core::{Error, Result};
use splitd_link::{
    AcceptorConfig, CBOR_CODEC, ClientOptions, Codec, DEFAULT_BUFFER_SIZE, DEFAULT_SOCKET_PATH,
    SocketFlavor, TransportOptions,
};
use url::Url;

/// Environment variable naming the configuration file.
pub const CONF_FILE_ENV: &str = "SPLITD_CONF_FILE";

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub sdk: SdkConfig,
    pub recorder: RecorderConfig,
    pub logging: LoggingConfig,
}

/// Local socket settings shared by the daemon and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub socket_path: PathBuf,
    pub flavor: SocketFlavor,
    pub serialization: String,
    pub max_connections: usize,
    pub accept_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub buffer_size: usize,
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// YAML flag definitions. Without it every evaluation answers `control`.
    pub rules_file: Option<PathBuf>,
    pub impressions_queue_size: usize,
    pub impressions_refresh_secs: u64,
    pub events_queue_size: usize,
    pub events_refresh_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Events backend base URL. Unset means batches are logged and discarded.
    pub url: Option<Url>,
    pub api_key: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULT IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════════════

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            flavor: SocketFlavor::default(),
            serialization: CBOR_CODEC.to_string(),
            max_connections: 1024,
            accept_timeout_ms: 1000,
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
            buffer_size: DEFAULT_BUFFER_SIZE,
            shutdown_grace_secs: 5,
        }
    }
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            rules_file: None,
            impressions_queue_size: 8192,
            impressions_refresh_secs: 30,
            events_queue_size: 8192,
            events_refresh_secs: 60,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: String::new(),
            timeout_ms: 10_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Pick the configuration file: an explicit path wins over `env_value`
/// (the content of [`CONF_FILE_ENV`]). Empty values count as unset.
#[must_use]
pub fn resolve_path(explicit: Option<&Path>, env_value: Option<&str>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env_value.filter(|v| !v.is_empty()).map(PathBuf::from))
}

/// Load and validate the configuration.
///
/// `explicit` comes from the command line; otherwise [`CONF_FILE_ENV`] is
/// consulted. With neither, defaults are used.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is malformed YAML, or fails
/// [`Config::validate`].
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let env_value = std::env::var(CONF_FILE_ENV).ok();
    match resolve_path(explicit, env_value.as_deref()) {
        Some(path) => load_file(&path),
        None => {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Load and validate one YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is malformed YAML, or fails
/// [`Config::validate`].
pub fn load_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
    let config = Config::from_yaml(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Parse without validating. Empty input yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::YamlParseFailed`] on malformed YAML or unknown values.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| Error::yaml_parse_failed(e.to_string()))
    }

    /// Reject settings the daemon cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let link = &self.link;
        let sdk = &self.sdk;

        Codec::from_name(&link.serialization)
            .map_err(|e| Error::invalid_config(format!("link.serialization: {e}")))?;

        let positive = [
            ("link.max_connections", link.max_connections as u64),
            ("link.accept_timeout_ms", link.accept_timeout_ms),
            ("link.read_timeout_ms", link.read_timeout_ms),
            ("link.write_timeout_ms", link.write_timeout_ms),
            ("link.buffer_size", link.buffer_size as u64),
            ("sdk.impressions_queue_size", sdk.impressions_queue_size as u64),
            ("sdk.impressions_refresh_secs", sdk.impressions_refresh_secs),
            ("sdk.events_queue_size", sdk.events_queue_size as u64),
            ("sdk.events_refresh_secs", sdk.events_refresh_secs),
            ("recorder.timeout_ms", self.recorder.timeout_ms),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(Error::invalid_config(format!("{field} must be greater than zero")));
        }

        if link.socket_path.as_os_str().is_empty() {
            return Err(Error::invalid_config("link.socket_path must not be empty"));
        }
        Ok(())
    }
}

impl LinkConfig {
    /// Codec named by `serialization`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an unknown codec name.
    pub fn codec(&self) -> Result<Codec> {
        Codec::from_name(&self.serialization)
            .map_err(|e| Error::invalid_config(format!("link.serialization: {e}")))
    }

    #[must_use]
    pub const fn transport(&self) -> TransportOptions {
        TransportOptions {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            buffer_size: self.buffer_size,
        }
    }

    #[must_use]
    pub fn acceptor(&self) -> AcceptorConfig {
        let mut config = AcceptorConfig::new(&self.socket_path, self.flavor)
            .with_max_connections(self.max_connections)
            .with_accept_timeout(Duration::from_millis(self.accept_timeout_ms))
            .with_transport(self.transport());
        config.shutdown_grace = Duration::from_secs(self.shutdown_grace_secs);
        config
    }

    /// Client-side view of the same socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an unknown codec name.
    pub fn client(&self) -> Result<ClientOptions> {
        Ok(ClientOptions {
            path: self.socket_path.clone(),
            flavor: self.flavor,
            codec: self.codec()?,
            transport: self.transport(),
        })
    }
}

impl SdkConfig {
    #[must_use]
    pub const fn impressions_period(&self) -> Duration {
        Duration::from_secs(self.impressions_refresh_secs)
    }

    #[must_use]
    pub const fn events_period(&self) -> Duration {
        Duration::from_secs(self.events_refresh_secs)
    }
}

impl RecorderConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
