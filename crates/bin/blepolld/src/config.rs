//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `blepoll.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use blepoll_app::services::request_gate::GateConfig;
use blepoll_app::services::session::SessionConfig;
use blepoll_domain::address::BleAddress;
use blepoll_domain::family::Classifier;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target device settings.
    pub device: DeviceConfig,
    /// Session timers.
    pub session: SessionSettings,
    /// Radio backend selection.
    pub radio: RadioConfig,
    /// Periodic polling.
    pub poll: PollConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Which device to poll and how long to look for it.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Default address, used by requests that do not name one.
    pub address: Option<String>,
    /// Bound on each discovery window, in seconds.
    pub scanning_timeout_secs: u64,
}

/// Acquisition session timers.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Disconnect watchdog, in seconds.
    pub watchdog_secs: u64,
    /// Expiry of a silent notification listener, in seconds.
    pub listener_expiry_secs: u64,
}

/// Radio backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The host adapter through btleplug.
    #[default]
    Btleplug,
    /// The simulated demo radio.
    Virtual,
}

/// Radio settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Which radio to drive.
    pub backend: Backend,
    /// Devices that only broadcast their readings.
    pub broadcast_addresses: Vec<String>,
}

/// Periodic polling.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Interval between default requests, in seconds; `0` disables polling.
    pub interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `blepoll.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("blepoll.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BLEPOLL_ADDRESS") {
            self.device.address = Some(val);
        }
        if let Ok(val) = std::env::var("BLEPOLL_SCAN_TIMEOUT")
            && let Ok(secs) = val.parse()
        {
            self.device.scanning_timeout_secs = secs;
        }
        if let Ok(val) = std::env::var("BLEPOLL_RADIO") {
            match val.to_ascii_lowercase().as_str() {
                "btleplug" => self.radio.backend = Backend::Btleplug,
                "virtual" => self.radio.backend = Backend::Virtual,
                _ => {}
            }
        }
        if let Ok(val) = std::env::var("BLEPOLL_POLL_INTERVAL")
            && let Ok(secs) = val.parse()
        {
            self.poll.interval_secs = secs;
        }
        if let Ok(val) = std::env::var("BLEPOLL_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.device.scanning_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "scanning timeout must be non-zero".to_string(),
            ));
        }
        if self.session.watchdog_secs == 0 || self.session.listener_expiry_secs == 0 {
            return Err(ConfigError::Validation(
                "session timers must be non-zero".to_string(),
            ));
        }
        self.default_address()?;
        self.broadcast_addresses()?;
        Ok(())
    }

    /// The configured default address, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when the address does not parse.
    pub fn default_address(&self) -> Result<Option<BleAddress>, ConfigError> {
        self.device
            .address
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(parse_address)
            .transpose()
    }

    fn broadcast_addresses(&self) -> Result<Vec<BleAddress>, ConfigError> {
        self.radio
            .broadcast_addresses
            .iter()
            .map(|raw| parse_address(raw))
            .collect()
    }

    /// Settings for the request gate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when an address does not parse.
    pub fn gate(&self) -> Result<GateConfig, ConfigError> {
        Ok(GateConfig {
            default_address: self.default_address()?,
            scan_window: Duration::from_secs(self.device.scanning_timeout_secs),
            session: SessionConfig {
                watchdog: Duration::from_secs(self.session.watchdog_secs),
                listener_expiry: Duration::from_secs(self.session.listener_expiry_secs),
            },
            classifier: Classifier::new(self.broadcast_addresses()?),
        })
    }

    /// Interval of periodic polling, if enabled.
    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll.interval_secs > 0).then_some(Duration::from_secs(self.poll.interval_secs))
    }
}

fn parse_address(raw: &str) -> Result<BleAddress, ConfigError> {
    raw.parse()
        .map_err(|err| ConfigError::Validation(format!("invalid address {raw:?}: {err}")))
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: None,
            scanning_timeout_secs: 10,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            watchdog_secs: 30,
            listener_expiry_secs: 30,
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            broadcast_addresses: vec!["58:2d:34:10:b2:9b".to_string()],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "blepolld=info,blepoll=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
