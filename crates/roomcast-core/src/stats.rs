//! Relay-wide counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters shared by the registry and every room it creates.
#[derive(Debug, Default)]
pub struct RelayCounters {
    rooms_created: AtomicU64,
    rooms_deleted: AtomicU64,
    messages_posted: AtomicU64,
    messages_delivered: AtomicU64,
    bytes_delivered: AtomicU64,
    delivery_failures: AtomicU64,
    messages_dropped: AtomicU64,
}

impl RelayCounters {
    pub(crate) fn room_created(&self) {
        self.rooms_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn room_deleted(&self) {
        self.rooms_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn message_posted(&self) {
        self.messages_posted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self, bytes: usize) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
        self.bytes_delivered.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn delivery_failed(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self, count: u64) {
        self.messages_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            rooms_created: self.rooms_created.load(Ordering::Relaxed),
            rooms_deleted: self.rooms_deleted.load(Ordering::Relaxed),
            messages_posted: self.messages_posted.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

/// A copy of [`RelayCounters`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Rooms created since start.
    pub rooms_created: u64,
    /// Rooms whose worker has finished.
    pub rooms_deleted: u64,
    /// Messages accepted into a room queue.
    pub messages_posted: u64,
    /// Individual successful deliveries (one per recipient).
    pub messages_delivered: u64,
    /// Payload bytes written to recipients.
    pub bytes_delivered: u64,
    /// Deliveries that failed with a transport error.
    pub delivery_failures: u64,
    /// Messages discarded because their room shut down first.
    pub messages_dropped: u64,
}
