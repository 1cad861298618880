//! Single-slot, latest-wins buffer for webcam snapshots.
//!
//! Snapshots are not queued: only the most recent image is worth delivering,
//! so each write overwrites the previous value and intermediate snapshots
//! between two takes are lost.

use std::sync::Mutex;

use crate::reading::Snapshot;

/// Atomic single-slot mailbox holding the most recent snapshot.
///
/// `update` and `take` are O(1) and never suspend; the slot is safe to share
/// between the snapshot source and the collector behind an `Arc`.
#[derive(Default)]
pub struct SnapshotSlot {
    inner: Mutex<Option<Snapshot>>,
}

impl SnapshotSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot, unconditionally replacing any held value.
    ///
    /// Returns the overwritten snapshot, if one was pending.
    pub fn update(&self, snapshot: Snapshot) -> Option<Snapshot> {
        self.inner
            .lock()
            .expect("snapshot slot lock poisoned")
            .replace(snapshot)
    }

    /// Atomically take and clear the held snapshot, if present.
    pub fn take(&self) -> Option<Snapshot> {
        self.inner
            .lock()
            .expect("snapshot slot lock poisoned")
            .take()
    }

    /// Whether a snapshot is currently pending.
    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .expect("snapshot slot lock poisoned")
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tag: u8) -> Snapshot {
        Snapshot::new(vec![tag], "image/jpeg")
    }

    #[test]
    fn test_empty_slot_yields_nothing() {
        let slot = SnapshotSlot::new();
        assert!(slot.is_empty());
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_take_clears_slot() {
        let slot = SnapshotSlot::new();
        slot.update(snapshot(1));

        assert!(!slot.is_empty());
        assert!(slot.take().is_some());
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_latest_write_wins() {
        let slot = SnapshotSlot::new();
        assert!(slot.update(snapshot(1)).is_none());

        // Second write overwrites the first before any take.
        let overwritten = slot.update(snapshot(2)).unwrap();
        assert_eq!(overwritten.image_data, vec![1]);

        let taken = slot.take().unwrap();
        assert_eq!(taken.image_data, vec![2]);
        assert!(slot.take().is_none());
    }
}
