//! Weather Collector - station-to-cloud relay daemon
//!
//! Collects readings from a weather sensor and snapshots from an optional
//! webcam, and delivers both to a remote HTTP collector. Undelivered
//! readings are held in a bounded in-memory backlog and retried; snapshots
//! are latest-wins and never retried.
//!
//! ## Usage
//!
//! ```text
//! weather-collector <config.toml>
//! ```
//!
//! The configuration path can also be set via `WEATHER_COLLECTOR_CONFIG`.
//! Logging is controlled by `RUST_LOG` (default: info).

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use weather_collector::config::Config;
use weather_collector::daemon::Daemon;

#[tokio::main]
async fn main() {
    init_tracing();

    let config_path = match config_path() {
        Some(path) => path,
        None => {
            error!("Usage: weather-collector <config.toml>");
            std::process::exit(2);
        }
    };

    let config = match Config::load(&config_path) {
        Ok(config) => {
            info!(
                path = %config_path,
                collect_interval_secs = config.daemon.collect_interval_secs,
                queue_capacity = config.queue.capacity,
                backlog_capacity = config.queue.backlog_capacity,
                max_batch = config.queue.max_batch,
                webcam = config.webcam.is_some(),
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = Daemon::new(config).run().await {
        error!(error = %e, "Startup failed");
        std::process::exit(1);
    }
}

/// Configuration file path from the first argument or the environment.
fn config_path() -> Option<String> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("WEATHER_COLLECTOR_CONFIG").ok())
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
