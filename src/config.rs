//! Engine configuration.
//!
//! An [`EngineConfig`] can be built in code through [`EngineConfigBuilder`]
//! or read from TOML. Every key is optional in TOML; missing keys keep the
//! firmware defaults from [`crate::core::constants`].
//!
//! ```toml
//! device_name = "PPG_HOLTER"
//! scan_timeout_secs = 10
//! connect_timeout_secs = 30
//!
//! [timeouts]
//! global_timeout_secs = 180
//! stall_timeout_secs = 20
//! poll_interval_ms = 200
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::core::constants::{
    BYTES_PER_SAMPLE, CONNECT_TIMEOUT, DEFAULT_DEVICE_NAME, MIN_CHANNEL_BYTES, NOTIFY_CHARACTERISTIC_UUID,
    REQUEST_QUEUE_DEPTH, SCAN_TIMEOUT, SERVICE_UUID, WRITE_CHARACTERISTIC_UUID,
};
use crate::session::TimeoutPolicy;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but are inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Session engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Exact advertised name to connect to.
    pub device_name: String,
    /// GATT service of the recorder.
    pub service_uuid: Uuid,
    /// Characteristic notifications arrive on.
    pub notify_characteristic: Uuid,
    /// Characteristic commands are written to.
    pub write_characteristic: Uuid,
    /// Scan window.
    pub scan_timeout: Duration,
    /// Connect bound.
    pub connect_timeout: Duration,
    /// Download ceilings and poll period.
    pub timeouts: TimeoutPolicy,
    /// Bytes per channel for a sequence to count as complete.
    pub min_channel_bytes: usize,
    /// Capacity of the request queue into the session loop.
    pub request_queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            service_uuid: SERVICE_UUID,
            notify_characteristic: NOTIFY_CHARACTERISTIC_UUID,
            write_characteristic: WRITE_CHARACTERISTIC_UUID,
            scan_timeout: SCAN_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            timeouts: TimeoutPolicy::default(),
            min_channel_bytes: MIN_CHANNEL_BYTES,
            request_queue_depth: REQUEST_QUEUE_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Start a builder from the defaults.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(input)?;
        let config = Self::from(raw);
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check the values are usable together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.is_empty() {
            return Err(ConfigError::Invalid("device_name is empty".into()));
        }

        let intervals = [
            ("scan_timeout", self.scan_timeout),
            ("connect_timeout", self.connect_timeout),
            ("global_timeout", self.timeouts.global),
            ("stall_timeout", self.timeouts.stall),
            ("poll_interval", self.timeouts.poll_interval),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }

        if self.timeouts.stall > self.timeouts.global {
            return Err(ConfigError::Invalid(format!(
                "stall_timeout ({:?}) exceeds global_timeout ({:?})",
                self.timeouts.stall, self.timeouts.global
            )));
        }
        if self.min_channel_bytes % BYTES_PER_SAMPLE != 0 {
            return Err(ConfigError::Invalid(format!(
                "min_channel_bytes ({}) is not a multiple of {BYTES_PER_SAMPLE}",
                self.min_channel_bytes
            )));
        }
        if self.request_queue_depth == 0 {
            return Err(ConfigError::Invalid("request_queue_depth must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a builder holding the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised name filter.
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.config.device_name = name.into();
        self
    }

    /// Set the GATT service UUID.
    pub fn service_uuid(mut self, uuid: Uuid) -> Self {
        self.config.service_uuid = uuid;
        self
    }

    /// Set the notification characteristic.
    pub fn notify_characteristic(mut self, uuid: Uuid) -> Self {
        self.config.notify_characteristic = uuid;
        self
    }

    /// Set the command characteristic.
    pub fn write_characteristic(mut self, uuid: Uuid) -> Self {
        self.config.write_characteristic = uuid;
        self
    }

    /// Set the scan window.
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.config.scan_timeout = timeout;
        self
    }

    /// Set the connect bound.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the global download ceiling.
    pub fn global_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.global = timeout;
        self
    }

    /// Set the stall ceiling.
    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.stall = timeout;
        self
    }

    /// Set the completion poll period.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.timeouts.poll_interval = interval;
        self
    }

    /// Set the per-channel completeness threshold in bytes.
    pub fn min_channel_bytes(mut self, bytes: usize) -> Self {
        self.config.min_channel_bytes = bytes;
        self
    }

    /// Set the request queue capacity.
    pub fn request_queue_depth(mut self, depth: usize) -> Self {
        self.config.request_queue_depth = depth;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// On-disk layout: durations as integer seconds.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    device_name: String,
    service_uuid: Uuid,
    notify_characteristic: Uuid,
    write_characteristic: Uuid,
    scan_timeout_secs: u64,
    connect_timeout_secs: u64,
    timeouts: TimeoutPolicy,
    min_channel_bytes: usize,
    request_queue_depth: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            device_name: config.device_name,
            service_uuid: config.service_uuid,
            notify_characteristic: config.notify_characteristic,
            write_characteristic: config.write_characteristic,
            scan_timeout_secs: config.scan_timeout.as_secs(),
            connect_timeout_secs: config.connect_timeout.as_secs(),
            timeouts: config.timeouts,
            min_channel_bytes: config.min_channel_bytes,
            request_queue_depth: config.request_queue_depth,
        }
    }
}

impl From<RawConfig> for EngineConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            device_name: raw.device_name,
            service_uuid: raw.service_uuid,
            notify_characteristic: raw.notify_characteristic,
            write_characteristic: raw.write_characteristic,
            scan_timeout: Duration::from_secs(raw.scan_timeout_secs),
            connect_timeout: Duration::from_secs(raw.connect_timeout_secs),
            timeouts: raw.timeouts,
            min_channel_bytes: raw.min_channel_bytes,
            request_queue_depth: raw.request_queue_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_firmware() {
        let config = EngineConfig::default();
        assert_eq!(config.device_name, "PPG_HOLTER");
        assert_eq!(
            config.notify_characteristic.to_string(),
            "9ecadc24-0ee5-a9e0-93f3-a3b50300406e"
        );
        assert_eq!(config.scan_timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.min_channel_bytes, 4096);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
            device_name = "BENCH_UNIT"
            scan_timeout_secs = 4

            [timeouts]
            stall_timeout_secs = 5
            poll_interval_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.device_name, "BENCH_UNIT");
        assert_eq!(config.scan_timeout, Duration::from_secs(4));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.timeouts.global, Duration::from_secs(180));
        assert_eq!(config.timeouts.stall, Duration::from_secs(5));
        assert_eq!(config.timeouts.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_toml_uuid_override() {
        let config = EngineConfig::from_toml_str(
            r#"write_characteristic = "0000ffe1-0000-1000-8000-00805f9b34fb""#,
        )
        .unwrap();
        assert_eq!(
            config.write_characteristic,
            Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb)
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = EngineConfig::from_toml_str("scan_window = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_inconsistent_values() {
        let err = EngineConfig::builder().device_name("").build().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EngineConfig::builder()
            .poll_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("poll_interval"));

        let err = EngineConfig::builder()
            .global_timeout(Duration::from_secs(10))
            .stall_timeout(Duration::from_secs(20))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_validate_rejects_partial_sample_threshold() {
        let err = EngineConfig::builder()
            .min_channel_bytes(4097)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("min_channel_bytes"));

        let err = EngineConfig::from_toml_str("min_channel_bytes = 6").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = EngineConfig::builder()
            .device_name("PPG_HOLTER_2")
            .connect_timeout(Duration::from_secs(5))
            .min_channel_bytes(64)
            .request_queue_depth(4)
            .build()
            .unwrap();

        assert_eq!(config.device_name, "PPG_HOLTER_2");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.min_channel_bytes, 64);
        assert_eq!(config.request_queue_depth, 4);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::from_path("/nonexistent/vitalink.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
