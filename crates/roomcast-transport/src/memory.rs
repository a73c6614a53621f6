//! In-process connection pairs.
//!
//! A [`MemoryConnection`] behaves like an accepted socket from the server's
//! point of view, while the matching [`MemoryPeer`] plays the remote client.
//! Used by unit tests and benchmarks to drive rooms without a network.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

use crate::traits::{Connection, ConnectionId, Payload, TransportError};

/// Default outbound buffer per connection.
pub const DEFAULT_MEMORY_CAPACITY: usize = 1024;

enum Inbound {
    Payload(Payload),
    Error(String),
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    remote_id: String,
    inbound: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    outbound: mpsc::Sender<Payload>,
    closed: watch::Sender<bool>,
    is_open: AtomicBool,
}

/// Client side of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::Receiver<Payload>,
    closed: watch::Receiver<bool>,
}

impl MemoryConnection {
    /// Create a connected pair with the default outbound buffer.
    #[must_use]
    pub fn pair(remote_id: impl Into<String>) -> (Self, MemoryPeer) {
        Self::pair_with_capacity(remote_id, DEFAULT_MEMORY_CAPACITY)
    }

    /// Create a connected pair whose server-to-peer buffer holds at most
    /// `capacity` payloads. Once full, [`Connection::send`] waits for the peer
    /// to read.
    #[must_use]
    pub fn pair_with_capacity(remote_id: impl Into<String>, capacity: usize) -> (Self, MemoryPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(capacity.max(1));
        let (closed_tx, closed_rx) = watch::channel(false);

        let conn = Self {
            id: ConnectionId::generate(),
            remote_id: remote_id.into(),
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
            closed: closed_tx,
            is_open: AtomicBool::new(true),
        };
        let peer = MemoryPeer {
            inbound: Some(in_tx),
            outbound: out_rx,
            closed: closed_rx,
        };
        (conn, peer)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn remote_id(&self) -> String {
        self.remote_id.clone()
    }

    async fn recv(&self) -> Result<Option<Payload>, TransportError> {
        let mut closed = self.closed.subscribe();
        let mut inbound = self.inbound.lock().await;

        tokio::select! {
            _ = closed.wait_for(|closed| *closed) => Ok(None),
            item = inbound.recv() => match item {
                Some(Inbound::Payload(payload)) => Ok(Some(payload)),
                Some(Inbound::Error(reason)) => {
                    self.is_open.store(false, Ordering::SeqCst);
                    Err(TransportError::ReceiveFailed(reason))
                }
                None => {
                    self.is_open.store(false, Ordering::SeqCst);
                    Ok(None)
                }
            },
        }
    }

    async fn send(&self, payload: Payload) -> Result<(), TransportError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(payload)
            .await
            .map_err(|_| TransportError::SendFailed("peer stopped reading".into()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.is_open.store(false, Ordering::SeqCst);
        self.closed.send_replace(true);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}

impl MemoryPeer {
    /// Send a payload to the server side. Returns `false` once disconnected.
    pub fn send(&self, payload: impl Into<Payload>) -> bool {
        match &self.inbound {
            Some(tx) => tx.send(Inbound::Payload(payload.into())).is_ok(),
            None => false,
        }
    }

    /// Make the server side's next `recv` fail with a read error.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        match &self.inbound {
            Some(tx) => tx.send(Inbound::Error(reason.into())).is_ok(),
            None => false,
        }
    }

    /// Hang up cleanly: the server side sees end of stream.
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }

    /// Stop accepting server writes; further sends to this peer fail.
    pub fn stop_reading(&mut self) {
        self.outbound.close();
    }

    /// Wait for the next payload written by the server.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.outbound.recv().await
    }

    /// Wait up to `timeout` for the next payload written by the server.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Payload> {
        tokio::time::timeout(timeout, self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Take a payload if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.outbound.try_recv().ok()
    }

    /// Whether the server side has closed the connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Wait until the server side closes the connection.
    pub async fn closed(&mut self) {
        let _ = self.closed.wait_for(|closed| *closed).await;
    }
}
