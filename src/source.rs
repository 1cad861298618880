//! Source boundaries for the weather sensor and the webcam.
//!
//! The daemon never talks to hardware directly: a [`SensorSource`] pushes
//! readings into the bounded queue and a [`SnapshotSource`] writes into the
//! latest-wins slot, each behind an async `start`/`stop` contract. Runtime
//! reconnection is owned by the source itself and paced by a configurable
//! [`BackoffPolicy`].
//!
//! The simulated implementations in this module generate plausible weather
//! data so the daemon runs end to end without a station or camera attached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::ReadingSender;
use crate::reading::{Reading, SensorField, Snapshot, BATTERY_EXTERNAL_POWER};
use crate::slot::SnapshotSlot;

/// Default base delay for exponential reconnect backoff (in milliseconds).
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// Maximum delay between reconnect attempts (in milliseconds).
const MAX_BACKOFF_DELAY_MS: u64 = 30_000;

/// Errors raised at the source boundary.
#[derive(Debug)]
pub enum SourceError {
    /// The device could not be reached
    Connection(String),

    /// `start` was called on a source that is already running
    AlreadyRunning,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Connection(e) => write!(f, "Source connection failed: {}", e),
            SourceError::AlreadyRunning => write!(f, "Source is already running"),
        }
    }
}

impl std::error::Error for SourceError {}

/// Boundary for the wireless weather sensor.
///
/// Implementations push assembled readings through the [`ReadingSender`] they
/// were constructed with. A `start` failure is fatal at startup; losing the
/// device at runtime is the source's own problem to retry.
#[async_trait]
pub trait SensorSource: Send {
    async fn start(&mut self) -> Result<(), SourceError>;
    async fn stop(&mut self) -> Result<(), SourceError>;
}

/// Boundary for the webcam snapshot producer.
///
/// Implementations write each new snapshot into the shared [`SnapshotSlot`].
#[async_trait]
pub trait SnapshotSource: Send {
    async fn start(&mut self) -> Result<(), SourceError>;
    async fn stop(&mut self) -> Result<(), SourceError>;
}

/// Pacing policy for source reconnect attempts.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Constant delay between attempts
    Fixed { delay_ms: u64 },

    /// Exponential delay with jitter, capped at `cap_ms`
    Exponential { base_ms: u64, cap_ms: u64 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base_ms: DEFAULT_BACKOFF_BASE_MS,
            cap_ms: MAX_BACKOFF_DELAY_MS,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait before the given retry attempt (0-based).
    ///
    /// Exponential delays grow as `base * 2^attempt` with up to 25% jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            BackoffPolicy::Exponential { base_ms, cap_ms } => {
                let exponential = base_ms.saturating_mul(1 << attempt.min(10));
                let jitter = rand::random::<u64>() % (exponential / 4 + 1);
                Duration::from_millis(exponential.saturating_add(jitter).min(*cap_ms))
            }
        }
    }
}

/// Configuration for the simulated sensor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatedSensorConfig {
    /// Interval between generated readings, in seconds
    pub reading_interval_secs: u64,

    /// Probability (0.0 - 1.0) that an iteration simulates a lost link
    pub dropout_rate: f64,

    /// Reconnect pacing after a simulated dropout
    pub backoff: BackoffPolicy,
}

impl Default for SimulatedSensorConfig {
    fn default() -> Self {
        Self {
            reading_interval_secs: 10,
            dropout_rate: 0.0,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Simulated weather sensor.
///
/// Generates readings with plausible correlated values at a fixed interval
/// and pushes them through the queue with backpressure. Values go through the
/// same [`SensorField`] wire-key mapping a hardware backend would use, so the
/// mapping stays exercised in the running daemon.
pub struct SimulatedSensor {
    config: SimulatedSensorConfig,
    sender: ReadingSender,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedSensor {
    pub fn new(config: SimulatedSensorConfig, sender: ReadingSender) -> Self {
        Self {
            config,
            sender,
            shutdown: CancellationToken::new(),
            handle: None,
        }
    }

    async fn run(
        config: SimulatedSensorConfig,
        sender: ReadingSender,
        shutdown: CancellationToken,
    ) {
        let mut ticker = interval(Duration::from_secs(config.reading_interval_secs.max(1)));
        let mut reconnect_attempt: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if config.dropout_rate > 0.0 && rand::random::<f64>() < config.dropout_rate {
                let delay = config.backoff.delay(reconnect_attempt);
                reconnect_attempt += 1;
                warn!(
                    attempt = reconnect_attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Simulated sensor link lost, reconnecting"
                );
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }
            reconnect_attempt = 0;

            let reading = generate_reading();
            debug!(
                temperature = ?reading.temperature,
                wind_speed = ?reading.wind_speed,
                "Simulated reading assembled"
            );

            if sender.push(reading).await.is_err() {
                info!("Reading queue closed, simulated sensor stopping");
                break;
            }
        }
    }
}

#[async_trait]
impl SensorSource for SimulatedSensor {
    async fn start(&mut self) -> Result<(), SourceError> {
        if self.handle.is_some() {
            return Err(SourceError::AlreadyRunning);
        }
        info!(
            interval_secs = self.config.reading_interval_secs,
            "Simulated sensor starting"
        );
        let task = Self::run(
            self.config.clone(),
            self.sender.clone(),
            self.shutdown.child_token(),
        );
        self.handle = Some(tokio::spawn(task));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SourceError> {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Simulated sensor stopped");
        Ok(())
    }
}

/// Generate one reading with plausible, internally consistent values.
fn generate_reading() -> Reading {
    let mut rng = rand::thread_rng();

    let temperature = rng.gen_range(-5.0..30.0);
    let humidity = rng.gen_range(35.0..95.0);
    let wind_speed = rng.gen_range(0.0..12.0);
    let raining = rng.gen_bool(0.15);
    let battery = if rng.gen_bool(0.2) {
        BATTERY_EXTERNAL_POWER as f64
    } else {
        rng.gen_range(60..=100) as f64
    };

    // Feed values through the wire-key mapping, like a hardware backend.
    let values = [
        ("battery", battery),
        ("temperature", temperature),
        ("humidity", humidity),
        ("dew_point", temperature - rng.gen_range(1.0..6.0)),
        ("pressure", rng.gen_range(985.0..1035.0)),
        ("illuminance", rng.gen_range(0.0..80_000.0)),
        ("speed_1", wind_speed),
        ("speed_2", wind_speed + rng.gen_range(0.0..5.0)),
        ("direction", rng.gen_range(0.0..360.0)),
        ("uv_index", rng.gen_range(0.0..9.0)),
        ("raining", if raining { 1.0 } else { 0.0 }),
        ("precipitation", if raining { rng.gen_range(0.1..8.0) } else { 0.0 }),
    ];

    let mut reading = Reading::new();
    for (key, value) in values {
        match SensorField::from_key(key) {
            Some(field) => field.apply(&mut reading, value),
            None => warn!(key, "Unknown sensor key, discarding value"),
        }
    }
    reading
}

/// Configuration for the simulated webcam.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatedWebcamConfig {
    /// Interval between generated snapshots, in seconds
    pub snapshot_interval_secs: u64,
}

impl Default for SimulatedWebcamConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: 60,
        }
    }
}

/// Simulated webcam writing synthetic JPEG payloads into the snapshot slot.
pub struct SimulatedWebcam {
    config: SimulatedWebcamConfig,
    slot: Arc<SnapshotSlot>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedWebcam {
    pub fn new(config: SimulatedWebcamConfig, slot: Arc<SnapshotSlot>) -> Self {
        Self {
            config,
            slot,
            shutdown: CancellationToken::new(),
            handle: None,
        }
    }

    async fn run(
        config: SimulatedWebcamConfig,
        slot: Arc<SnapshotSlot>,
        shutdown: CancellationToken,
    ) {
        let mut ticker = interval(Duration::from_secs(config.snapshot_interval_secs.max(1)));

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let snapshot = generate_snapshot();
            if slot.update(snapshot).is_some() {
                // Collector never consumed the previous image; latest wins.
                debug!("Unconsumed snapshot overwritten");
            }
        }
    }
}

#[async_trait]
impl SnapshotSource for SimulatedWebcam {
    async fn start(&mut self) -> Result<(), SourceError> {
        if self.handle.is_some() {
            return Err(SourceError::AlreadyRunning);
        }
        info!(
            interval_secs = self.config.snapshot_interval_secs,
            "Simulated webcam starting"
        );
        let task = Self::run(
            self.config.clone(),
            self.slot.clone(),
            self.shutdown.child_token(),
        );
        self.handle = Some(tokio::spawn(task));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SourceError> {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Simulated webcam stopped");
        Ok(())
    }
}

/// Build a placeholder JPEG-tagged payload with random body bytes.
fn generate_snapshot() -> Snapshot {
    let mut rng = rand::thread_rng();
    let mut image = vec![0xff, 0xd8, 0xff, 0xe0]; // JPEG SOI + APP0 marker
    image.extend((0..256).map(|_| rng.gen::<u8>()));
    Snapshot::new(image, "image/jpeg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    use crate::queue::ReadingQueue;

    #[test]
    fn test_fixed_backoff_is_constant() {
        let policy = BackoffPolicy::Fixed { delay_ms: 250 };
        assert_eq!(policy.delay(0), Duration::from_millis(250));
        assert_eq!(policy.delay(7), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_backoff_grows() {
        let policy = BackoffPolicy::Exponential {
            base_ms: 500,
            cap_ms: 30_000,
        };

        let delay0 = policy.delay(0);
        let delay2 = policy.delay(2);

        // Base 500ms with up to 25% jitter.
        assert!(delay0.as_millis() >= 500);
        assert!(delay0.as_millis() <= 625);

        // 500 * 4 with up to 25% jitter.
        assert!(delay2.as_millis() >= 2000);
        assert!(delay2.as_millis() <= 2500);
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let policy = BackoffPolicy::Exponential {
            base_ms: 500,
            cap_ms: 5_000,
        };
        assert!(policy.delay(20).as_millis() <= 5_000);
    }

    #[test]
    fn test_generated_reading_is_complete() {
        let reading = generate_reading();
        assert!(reading.temperature.is_some());
        assert!(reading.humidity.is_some());
        assert!(reading.wind_speed.is_some());
        assert!(reading.gust_speed.is_some());
        assert!(reading.raining.is_some());
        assert!(reading.battery.is_some());

        // Gust is never below sustained wind.
        assert!(reading.gust_speed.unwrap() >= reading.wind_speed.unwrap());
    }

    #[tokio::test]
    async fn test_simulated_sensor_pushes_readings() {
        let (sender, mut queue) = ReadingQueue::new(8);
        let shutdown = CancellationToken::new();

        let mut sensor = SimulatedSensor::new(
            SimulatedSensorConfig {
                reading_interval_secs: 1,
                dropout_rate: 0.0,
                backoff: BackoffPolicy::default(),
            },
            sender,
        );

        sensor.start().await.unwrap();

        // The first interval tick fires immediately.
        let reading = timeout(Duration::from_millis(500), queue.pop(&shutdown))
            .await
            .expect("reading should arrive promptly");
        assert!(reading.is_some());

        sensor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_sensor_start_twice_fails() {
        let (sender, _queue) = ReadingQueue::new(8);
        let mut sensor = SimulatedSensor::new(SimulatedSensorConfig::default(), sender);

        sensor.start().await.unwrap();
        assert!(matches!(
            sensor.start().await,
            Err(SourceError::AlreadyRunning)
        ));
        sensor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_sensor_stop_without_start() {
        let (sender, _queue) = ReadingQueue::new(8);
        let mut sensor = SimulatedSensor::new(SimulatedSensorConfig::default(), sender);
        sensor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_simulated_webcam_fills_slot() {
        let slot = Arc::new(SnapshotSlot::new());
        let mut webcam = SimulatedWebcam::new(
            SimulatedWebcamConfig {
                snapshot_interval_secs: 1,
            },
            slot.clone(),
        );

        webcam.start().await.unwrap();

        // First tick is immediate; poll until the slot fills.
        let mut snapshot = None;
        for _ in 0..50 {
            if let Some(s) = slot.take() {
                snapshot = Some(s);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        webcam.stop().await.unwrap();

        let snapshot = snapshot.expect("webcam should produce a snapshot");
        assert_eq!(&snapshot.image_data[..2], &[0xff, 0xd8]);
        assert_eq!(snapshot.image_type, "image/jpeg");
    }
}
