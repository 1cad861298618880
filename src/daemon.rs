//! Process lifecycle: startup ordering, signal handling, teardown ordering.
//!
//! The daemon owns the one shutdown token shared across the process.
//! Startup: sensor source, then webcam (if configured), then sink, then the
//! collector loop. Teardown on the first termination signal: cancel the
//! token, let the collector finish any in-flight delivery and apply its
//! outcome, then stop the sources. Cancelling the token is the only way the
//! system stops; no task is ever killed mid-send.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::collector::Collector;
use crate::config::Config;
use crate::queue::ReadingQueue;
use crate::sink::{HttpSink, SinkError};
use crate::slot::SnapshotSlot;
use crate::source::{
    SensorSource, SimulatedSensor, SimulatedWebcam, SnapshotSource, SourceError,
};

/// How long teardown waits for the collector to finish in-flight work.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Fatal startup errors.
#[derive(Debug)]
pub enum DaemonError {
    /// A source failed to start
    Source(SourceError),

    /// The delivery sink could not be prepared
    Sink(SinkError),
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::Source(e) => write!(f, "Failed to start source: {}", e),
            DaemonError::Sink(e) => write!(f, "Failed to prepare delivery sink: {}", e),
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::Source(e) => Some(e),
            DaemonError::Sink(e) => Some(e),
        }
    }
}

/// The assembled weather collector process.
pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until a termination signal arrives.
    pub async fn run(self) -> Result<(), DaemonError> {
        self.run_until(wait_for_signal()).await
    }

    /// Run until the given future resolves; the signal wait is injectable so
    /// tests can drive shutdown without raising OS signals.
    pub async fn run_until<F>(self, shutdown_signal: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        let shutdown = CancellationToken::new();

        let (sender, queue) = ReadingQueue::new(self.config.queue.capacity);
        let slot = Arc::new(SnapshotSlot::new());

        let mut sensor: Box<dyn SensorSource> =
            Box::new(SimulatedSensor::new(self.config.sensor.clone(), sender));
        let mut webcam: Option<Box<dyn SnapshotSource>> =
            self.config.webcam.clone().map(|webcam_config| {
                Box::new(SimulatedWebcam::new(webcam_config, slot.clone()))
                    as Box<dyn SnapshotSource>
            });

        // Startup order: sensor, webcam, sink, collector.
        sensor.start().await.map_err(DaemonError::Source)?;

        if let Some(webcam) = webcam.as_mut() {
            if let Err(e) = webcam.start().await {
                stop_source("sensor", sensor.stop().await);
                return Err(DaemonError::Source(e));
            }
        }

        let sink = match HttpSink::new(&self.config.sink) {
            Ok(sink) => sink,
            Err(e) => {
                stop_source("sensor", sensor.stop().await);
                if let Some(webcam) = webcam.as_mut() {
                    stop_source("webcam", webcam.stop().await);
                }
                return Err(DaemonError::Sink(e));
            }
        };
        info!(
            data_url = %sink.data_url(),
            image_url = %sink.image_url(),
            "Delivery sink prepared"
        );

        let collector = Collector::new(
            queue,
            slot.clone(),
            sink,
            &self.config.queue,
            self.config.daemon.collect_interval(),
            shutdown.clone(),
        );
        let collector_handle = tokio::spawn(collector.run());

        info!("Weather collector running");
        shutdown_signal.await;
        info!("Initiating graceful shutdown");

        // Teardown order: cancel the collector's wait first. An in-flight
        // delivery finishes and its outcome lands in the backlog stats.
        shutdown.cancel();
        match timeout(SHUTDOWN_TIMEOUT, collector_handle).await {
            Ok(Ok(stats)) => {
                info!(
                    readings_sent = stats.readings_sent,
                    snapshots_sent = stats.snapshots_sent,
                    delivery_failures = stats.delivery_failures,
                    backlog_len = stats.backlog_len,
                    "Collector shut down"
                );
            }
            Ok(Err(e)) => warn!(error = %e, "Collector task panicked during shutdown"),
            Err(_) => warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Collector shutdown timed out"
            ),
        }

        stop_source("sensor", sensor.stop().await);
        if let Some(webcam) = webcam.as_mut() {
            stop_source("webcam", webcam.stop().await);
        }

        info!("Weather collector stopped");
        Ok(())
    }
}

/// Runtime stop failures are logged, not propagated; shutdown continues.
fn stop_source(name: &str, result: Result<(), SourceError>) {
    if let Err(e) = result {
        warn!(source = name, error = %e, "Failed to stop source");
    }
}

/// Wait for SIGINT or SIGTERM. Repeated signals are harmless: the first one
/// resolves this future and teardown runs exactly once.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for SIGINT");
            } else {
                info!("Received SIGINT");
            }
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
