//! Collection-and-delivery orchestration loop.
//!
//! The collector waits for readings from the bounded queue and attempts one
//! delivery per arriving reading, piggy-backing the full retry backlog in
//! front of it. A successful attempt clears the entire backlog; a failed one
//! appends only the new reading, since the backlog already holds the rest.
//! On every iteration it also drains the latest-wins snapshot slot.
//!
//! Delivery failures are never fatal: they are logged, the data is
//! re-buffered, and the loop keeps going. Only cancellation of the shared
//! shutdown token ends it, and an attempt already in flight is allowed to
//! finish with its outcome applied before the loop exits.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::queue::ReadingQueue;
use crate::reading::Reading;
use crate::sink::DeliverySink;
use crate::slot::SnapshotSlot;

/// Bounded retry buffer of undelivered readings, oldest first.
///
/// When full, the oldest entry is evicted to admit a new one, trading
/// completeness for boundedness under a sustained outage. Evictions raise no
/// error but are counted.
pub struct Backlog {
    entries: VecDeque<Reading>,
    capacity: usize,
    evictions: u64,
}

impl Backlog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            evictions: 0,
        }
    }

    /// Append an undelivered reading, evicting the oldest entry when full.
    ///
    /// Returns `true` if an eviction happened.
    pub fn push(&mut self, reading: Reading) -> bool {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.evictions += 1;
            true
        } else {
            false
        };
        self.entries.push_back(reading);
        evicted
    }

    /// Drop the `count` oldest entries outright, returning how many were
    /// actually removed.
    pub fn drop_oldest(&mut self, count: usize) -> usize {
        let removed = count.min(self.entries.len());
        self.entries.drain(0..removed);
        removed
    }

    /// Discard all entries after a successful delivery.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total evictions since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}

/// Counters describing what the collector did over its lifetime.
#[derive(Debug, Clone, Default)]
pub struct CollectorStats {
    /// Readings popped from the queue
    pub readings_received: u64,

    /// Readings delivered successfully (including redelivered backlog)
    pub readings_sent: u64,

    /// Successful batch deliveries
    pub batches_sent: u64,

    /// Failed batch delivery attempts
    pub delivery_failures: u64,

    /// Backlog entries evicted because the backlog was full
    pub backlog_evictions: u64,

    /// Backlog entries dropped because a batch exceeded the size cap
    pub readings_truncated: u64,

    /// Snapshots delivered successfully
    pub snapshots_sent: u64,

    /// Snapshots discarded after a failed delivery
    pub snapshot_failures: u64,

    /// Undelivered readings still in the backlog when the loop exited
    pub backlog_len: usize,
}

/// The orchestration loop tying queue, slot, backlog and sink together.
pub struct Collector<S: DeliverySink> {
    queue: ReadingQueue,
    slot: Arc<SnapshotSlot>,
    sink: S,
    backlog: Backlog,
    max_batch: usize,
    collect_interval: Duration,
    shutdown: CancellationToken,
    stats: CollectorStats,
}

impl<S: DeliverySink> Collector<S> {
    pub fn new(
        queue: ReadingQueue,
        slot: Arc<SnapshotSlot>,
        sink: S,
        config: &QueueConfig,
        collect_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            slot,
            sink,
            backlog: Backlog::new(config.backlog_capacity),
            max_batch: config.max_batch,
            collect_interval,
            shutdown,
            stats: CollectorStats::default(),
        }
    }

    /// Run until the shutdown token fires or all producers are gone.
    ///
    /// Returns the final statistics. Readings still sitting unconsumed in
    /// the queue at shutdown are lost; that window is bounded by the queue
    /// capacity.
    pub async fn run(mut self) -> CollectorStats {
        info!(
            max_batch = self.max_batch,
            interval_secs = self.collect_interval.as_secs(),
            "Collector loop started"
        );

        let mut ticker = interval(self.collect_interval);
        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                maybe_reading = self.queue.pop(&self.shutdown) => {
                    match maybe_reading {
                        Some(reading) => {
                            self.deliver(reading).await;
                            self.flush_snapshot().await;
                        }
                        // Shutdown requested or all producers gone; stop
                        // without draining what is still queued.
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.flush_snapshot().await;
                }
            }
        }

        self.stats.backlog_len = self.backlog.len();
        info!(
            readings_sent = self.stats.readings_sent,
            batches_sent = self.stats.batches_sent,
            delivery_failures = self.stats.delivery_failures,
            backlog_len = self.stats.backlog_len,
            "Collector loop stopped"
        );
        self.stats
    }

    /// Attempt one delivery of the backlog plus the newly arrived reading.
    async fn deliver(&mut self, reading: Reading) {
        self.stats.readings_received += 1;

        // Cap the attempt at max_batch readings. Overflow is resolved by
        // dropping the oldest backlog entries outright, keeping the bound
        // hard; the drop is visible in the stats.
        let overflow = (self.backlog.len() + 1).saturating_sub(self.max_batch);
        if overflow > 0 {
            let dropped = self.backlog.drop_oldest(overflow);
            self.stats.readings_truncated += dropped as u64;
            warn!(
                dropped = dropped,
                max_batch = self.max_batch,
                "Batch size cap exceeded, dropping oldest backlog entries"
            );
        }

        let mut batch: Vec<Reading> = self.backlog.iter().cloned().collect();
        batch.push(reading.clone());

        match self.sink.send_readings(&batch).await {
            Ok(()) => {
                if !self.backlog.is_empty() {
                    info!(
                        redelivered = self.backlog.len(),
                        "Backlog flushed with successful delivery"
                    );
                }
                self.stats.batches_sent += 1;
                self.stats.readings_sent += batch.len() as u64;
                self.backlog.clear();
            }
            Err(e) => {
                // Only the new reading joins the backlog; the rest of the
                // failed batch is already there.
                self.stats.delivery_failures += 1;
                if self.backlog.push(reading) {
                    self.stats.backlog_evictions += 1;
                }
                warn!(
                    error = %e,
                    backlog_len = self.backlog.len(),
                    "Failed to deliver readings, re-buffered for retry"
                );
            }
        }
    }

    /// Deliver the pending snapshot, if any. Failures discard the snapshot;
    /// a stale image is not worth retrying.
    async fn flush_snapshot(&mut self) {
        let Some(snapshot) = self.slot.take() else {
            return;
        };

        debug!(timestamp = %snapshot.timestamp, "Flushing snapshot");
        match self.sink.send_snapshot(&snapshot).await {
            Ok(()) => self.stats.snapshots_sent += 1,
            Err(e) => {
                self.stats.snapshot_failures += 1;
                warn!(error = %e, "Failed to deliver snapshot, discarding");
            }
        }
    }
}
