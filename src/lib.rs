//! Weather Collector Library
//!
//! Components for relaying weather-station data to a remote collector:
//!
//! - **config**: TOML configuration with validation
//! - **reading**: sensor reading and snapshot data model
//! - **queue**: bounded reading queue with producer backpressure
//! - **slot**: latest-wins single-slot snapshot buffer
//! - **source**: sensor/webcam boundaries and simulated implementations
//! - **sink**: delivery boundary and the HTTP sink
//! - **collector**: batching, bounded retry backlog, orchestration loop
//! - **daemon**: lifecycle controller and signal handling
//!
//! # Example
//!
//! ```no_run
//! use weather_collector::config::Config;
//! use weather_collector::daemon::Daemon;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load("weather-collector.toml").expect("Failed to load config");
//!     Daemon::new(config).run().await.expect("Startup failed");
//! }
//! ```

// Module declarations
pub mod collector;
pub mod config;
pub mod daemon;
pub mod queue;
pub mod reading;
pub mod sink;
pub mod slot;
pub mod source;

// Re-export commonly used types at crate root for convenience
pub use collector::{Backlog, Collector, CollectorStats};
pub use config::{Config, ConfigError, DaemonConfig, QueueConfig, SinkConfig};
pub use daemon::{Daemon, DaemonError};
pub use queue::{QueueError, ReadingQueue, ReadingSender};
pub use reading::{Reading, SensorField, Snapshot, BATTERY_EXTERNAL_POWER};
pub use sink::{DeliverySink, HttpSink, SinkError};
pub use slot::SnapshotSlot;
pub use source::{
    BackoffPolicy, SensorSource, SimulatedSensor, SimulatedSensorConfig, SimulatedWebcam,
    SimulatedWebcamConfig, SnapshotSource, SourceError,
};
