//! Configuration for the weather collector daemon.
//!
//! Settings are loaded from a TOML file passed on the command line. Every
//! section except `[sink]` has working defaults; the sink endpoints and API
//! token must always be provided.
//!
//! ```toml
//! [daemon]
//! collect_interval_secs = 10
//!
//! [queue]
//! capacity = 200
//! backlog_capacity = 200
//! max_batch = 50
//!
//! [sensor]
//! reading_interval_secs = 10
//!
//! [webcam]
//! snapshot_interval_secs = 60
//!
//! [sink]
//! data_url = "https://collector.example.com/api/v1/data"
//! image_url = "https://collector.example.com/api/v1/image"
//! api_token = "secret"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::source::{SimulatedSensorConfig, SimulatedWebcamConfig};

/// Default interval between snapshot-flush checks, in seconds.
const DEFAULT_COLLECT_INTERVAL_SECS: u64 = 10;

/// Default reading queue capacity.
const DEFAULT_QUEUE_CAPACITY: usize = 200;

/// Default retry backlog capacity.
const DEFAULT_BACKLOG_CAPACITY: usize = 200;

/// Default per-attempt batch size cap.
const DEFAULT_MAX_BATCH: usize = 50;

/// Default HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound for queue, backlog and batch sizes.
const MAX_CAPACITY: usize = 10_000;

/// Bounds for the collect interval.
const MIN_COLLECT_INTERVAL_SECS: u64 = 1;
const MAX_COLLECT_INTERVAL_SECS: u64 = 300;

/// Error type for configuration loading failures.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub field: Option<String>,
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "Configuration error for {}: {}", field, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level daemon settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Interval between periodic snapshot-flush checks, in seconds
    pub collect_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            collect_interval_secs: DEFAULT_COLLECT_INTERVAL_SECS,
        }
    }
}

impl DaemonConfig {
    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_secs)
    }
}

/// Capacities for the reading queue and the retry backlog.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Reading queue capacity (producer backpressure beyond this)
    pub capacity: usize,

    /// Retry backlog capacity (oldest entries evicted beyond this)
    pub backlog_capacity: usize,

    /// Maximum readings per delivery attempt
    pub max_batch: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            backlog_capacity: DEFAULT_BACKLOG_CAPACITY,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

/// Remote collector endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// URL accepting reading batches
    pub data_url: String,

    /// URL accepting snapshot uploads
    pub image_url: String,

    /// Bearer token for both endpoints
    pub api_token: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub sensor: SimulatedSensorConfig,

    /// Webcam section is optional; absent means no snapshot source runs
    pub webcam: Option<SimulatedWebcamConfig>,

    pub sink: SinkConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError {
            message: format!("cannot read {}: {}", path.display(), e),
            field: None,
        })?;
        Self::parse(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|e| ConfigError {
            message: e.to_string(),
            field: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.daemon.collect_interval_secs;
        if !(MIN_COLLECT_INTERVAL_SECS..=MAX_COLLECT_INTERVAL_SECS).contains(&interval) {
            return Err(ConfigError::invalid(
                "daemon.collect_interval_secs",
                format!(
                    "interval {} outside allowed range {}..={}",
                    interval, MIN_COLLECT_INTERVAL_SECS, MAX_COLLECT_INTERVAL_SECS
                ),
            ));
        }

        for (field, value) in [
            ("queue.capacity", self.queue.capacity),
            ("queue.backlog_capacity", self.queue.backlog_capacity),
            ("queue.max_batch", self.queue.max_batch),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than 0"));
            }
            if value > MAX_CAPACITY {
                return Err(ConfigError::invalid(
                    field,
                    format!("{} exceeds maximum allowed ({})", value, MAX_CAPACITY),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.sensor.dropout_rate) {
            return Err(ConfigError::invalid(
                "sensor.dropout_rate",
                "must be between 0.0 and 1.0",
            ));
        }

        if self.sink.api_token.is_empty() {
            return Err(ConfigError::invalid("sink.api_token", "must not be empty"));
        }
        for (field, url) in [
            ("sink.data_url", &self.sink.data_url),
            ("sink.image_url", &self.sink.image_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::invalid(
                    field,
                    format!("'{}' is not an http(s) URL", url),
                ));
            }
        }

        Ok(())
    }
}
