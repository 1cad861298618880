//! Bounded queue carrying readings from the sensor source to the collector.
//!
//! The queue is a single-producer/single-consumer channel with backpressure:
//! when it is full, `push` suspends the producer until the collector makes
//! room. Losing raw sensor samples silently is worse than momentarily
//! stalling the sensor callback.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::reading::Reading;

/// Default queue capacity (number of undelivered readings).
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;

/// Errors that can occur when pushing into the reading queue.
#[derive(Debug)]
pub enum QueueError {
    /// The queue is full (non-blocking pushes only)
    Full,

    /// The consumer is gone and the queue no longer accepts readings
    Closed,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Full => write!(f, "Reading queue is full"),
            QueueError::Closed => write!(f, "Reading queue has been closed"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Producer handle for the reading queue.
///
/// Can be cloned if a source is split across tasks; the daemon hands one to
/// the sensor source.
#[derive(Clone)]
pub struct ReadingSender {
    tx: mpsc::Sender<Reading>,
}

impl ReadingSender {
    /// Push a reading, waiting for space if the queue is full.
    pub async fn push(&self, reading: Reading) -> Result<(), QueueError> {
        self.tx.send(reading).await.map_err(|_| QueueError::Closed)
    }

    /// Push a reading without waiting.
    pub fn try_push(&self, reading: Reading) -> Result<(), QueueError> {
        self.tx.try_send(reading).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

/// Consumer side of the reading queue, owned by the collector.
pub struct ReadingQueue {
    rx: mpsc::Receiver<Reading>,
}

impl ReadingQueue {
    /// Create a queue with the given capacity.
    ///
    /// Returns the producer handle and the consumer.
    pub fn new(capacity: usize) -> (ReadingSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (ReadingSender { tx }, Self { rx })
    }

    /// Create a queue with the default capacity.
    pub fn with_defaults() -> (ReadingSender, Self) {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }

    /// Wait for the next reading.
    ///
    /// Suspends until a reading arrives, all producers are gone, or the
    /// shutdown token fires. The shutdown branch is polled first so a pending
    /// cancellation wins over a pending reading; returns `None` in both
    /// terminal cases.
    pub async fn pop(&mut self, shutdown: &CancellationToken) -> Option<Reading> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            reading = self.rx.recv() => reading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    use crate::reading::Reading;

    #[tokio::test]
    async fn test_push_pop_preserves_order() {
        let (sender, mut queue) = ReadingQueue::new(8);
        let shutdown = CancellationToken::new();

        let mut readings = Vec::new();
        for i in 0..3 {
            let mut reading = Reading::new();
            reading.uv_index = Some(i);
            readings.push(reading.clone());
            sender.push(reading).await.unwrap();
        }

        for expected in readings {
            let got = queue.pop(&shutdown).await.unwrap();
            assert_eq!(got, expected);
        }
    }

    #[tokio::test]
    async fn test_try_push_full() {
        let (sender, _queue) = ReadingQueue::new(1);

        sender.try_push(Reading::new()).unwrap();
        let result = sender.try_push(Reading::new());
        assert!(matches!(result, Err(QueueError::Full)));
    }

    #[tokio::test]
    async fn test_push_closed() {
        let (sender, queue) = ReadingQueue::new(1);
        drop(queue);

        let result = sender.push(Reading::new()).await;
        assert!(matches!(result, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn test_pop_returns_none_when_producers_gone() {
        let (sender, mut queue) = ReadingQueue::new(4);
        let shutdown = CancellationToken::new();

        sender.push(Reading::new()).await.unwrap();
        drop(sender);

        assert!(queue.pop(&shutdown).await.is_some());
        assert!(queue.pop(&shutdown).await.is_none());
    }

    #[tokio::test]
    async fn test_pop_cancelled_by_shutdown() {
        let (_sender, mut queue) = ReadingQueue::new(4);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = timeout(Duration::from_millis(100), queue.pop(&shutdown)).await;
        assert!(result.expect("pop should return promptly").is_none());
    }

    #[tokio::test]
    async fn test_shutdown_wins_over_pending_reading() {
        let (sender, mut queue) = ReadingQueue::new(4);
        let shutdown = CancellationToken::new();

        sender.push(Reading::new()).await.unwrap();
        shutdown.cancel();

        // Even with a reading waiting, cancellation is observed first.
        assert!(queue.pop(&shutdown).await.is_none());
    }

    #[tokio::test]
    async fn test_push_applies_backpressure() {
        let (sender, mut queue) = ReadingQueue::new(1);
        let shutdown = CancellationToken::new();

        sender.push(Reading::new()).await.unwrap();

        // Second push must block until the consumer pops.
        let blocked = timeout(Duration::from_millis(50), sender.push(Reading::new())).await;
        assert!(blocked.is_err());

        queue.pop(&shutdown).await.unwrap();
        timeout(Duration::from_millis(100), sender.push(Reading::new()))
            .await
            .expect("push should proceed once space is available")
            .unwrap();
    }
}
