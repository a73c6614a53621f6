//! Messages queued for broadcast.

use roomcast_transport::{ConnectionId, Payload};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A unique message identifier.
pub type MessageId = u64;

/// Atomic counter for message IDs.
static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A payload waiting in a room's inbound queue.
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    /// Unique message identifier.
    pub id: MessageId,
    /// The client that posted the message; it is skipped on delivery.
    pub sender: ConnectionId,
    /// Opaque payload, forwarded verbatim.
    pub payload: Payload,
    /// Milliseconds since the Unix epoch when the message was created.
    pub timestamp: u64,
}

impl BroadcastMessage {
    /// Create a new message from `sender`.
    #[must_use]
    pub fn new(sender: ConnectionId, payload: impl Into<Payload>) -> Self {
        Self {
            id: generate_message_id(),
            sender,
            payload: payload.into(),
            timestamp: now_millis(),
        }
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = BroadcastMessage::new("conn-1".into(), "hello");
        assert_eq!(msg.sender.as_str(), "conn-1");
        assert_eq!(msg.payload, Payload::from("hello"));
        assert_eq!(msg.payload_size(), 5);
        assert!(msg.timestamp > 0);
    }

    #[test]
    fn test_message_ids_increase() {
        let first = BroadcastMessage::new("a".into(), "1");
        let second = BroadcastMessage::new("a".into(), "2");
        assert!(second.id > first.id);
    }
}
