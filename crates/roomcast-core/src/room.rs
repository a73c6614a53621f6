//! The room broadcast actor.
//!
//! Every room runs exactly one worker task. Clients hand messages to the
//! worker through a bounded queue ([`Room::post`]); the worker delivers each
//! message, in queue order, to every member except the sender. Membership is
//! a separate map mutated by [`Room::join`] and [`Room::leave`] and only
//! copied, never awaited on, by the worker.

use dashmap::DashMap;
use futures_util::future::join_all;
use roomcast_transport::{Connection, ConnectionId};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, trace, warn};

use crate::client::{Client, Membership};
use crate::code::RoomCode;
use crate::message::BroadcastMessage;
use crate::registry::WeakRegistry;
use crate::stats::RelayCounters;

/// Default inbound queue capacity.
pub const DEFAULT_INBOUND_CAPACITY: usize = 256;

/// Shared handle to a running room.
pub type RoomHandle = Arc<Room>;

/// Room errors.
#[derive(Debug, Error)]
pub enum RoomError {
    /// The room has been told to quit and accepts no more members or messages.
    #[error("Room {0} is closed")]
    Closed(RoomCode),
}

/// Per-room settings.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Capacity of the inbound message queue.
    pub inbound_capacity: usize,
    /// Quit automatically once the room has had no members for this long.
    /// `None` keeps empty rooms until they are deleted explicitly.
    pub reap_empty_after: Option<Duration>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            reap_empty_after: None,
        }
    }
}

/// Lifecycle of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RoomState {
    /// Accepting members and messages.
    Running = 0,
    /// Quit signal received; the worker is shutting down.
    Terminating = 1,
    /// The worker has exited and the room has left the registry.
    Deleted = 2,
}

impl RoomState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Terminating,
            _ => Self::Deleted,
        }
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Terminating => "terminating",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// A broadcast room.
pub struct Room {
    code: RoomCode,
    members: DashMap<ConnectionId, Arc<Client>>,
    inbound: mpsc::Sender<BroadcastMessage>,
    quit: Notify,
    membership_changed: Notify,
    state: AtomicU8,
    counters: Arc<RelayCounters>,
    created_at: Instant,
}

impl Room {
    /// Create a room that is not tracked by any registry and start its worker.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(code: RoomCode, config: RoomConfig) -> RoomHandle {
        Self::spawn_inner(code, config, Arc::new(RelayCounters::default()), None)
    }

    pub(crate) fn spawn_inner(
        code: RoomCode,
        config: RoomConfig,
        counters: Arc<RelayCounters>,
        registry: Option<WeakRegistry>,
    ) -> RoomHandle {
        let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));
        let room = Arc::new(Self {
            code,
            members: DashMap::new(),
            inbound: tx,
            quit: Notify::new(),
            membership_changed: Notify::new(),
            state: AtomicU8::new(RoomState::Running as u8),
            counters,
            created_at: Instant::now(),
        });

        room.counters.room_created();
        tokio::spawn(Arc::clone(&room).run(rx, registry, config.reap_empty_after));
        room
    }

    /// Get the room code.
    #[must_use]
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Get the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RoomState {
        RoomState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether the room still accepts members and messages.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == RoomState::Running
    }

    /// How long ago the room was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Get the number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if the room has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a client is a member.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    /// Copy the current member set.
    #[must_use]
    pub fn members(&self) -> Vec<Arc<Client>> {
        self.members.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Wrap `connection` in a new client and add it to the room.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Closed`] if the room is shutting down. The
    /// connection is dropped in that case.
    pub fn attach(self: &Arc<Self>, connection: Box<dyn Connection>) -> Result<Membership, RoomError> {
        let client = Arc::new(Client::new(connection, self));
        self.join(Arc::clone(&client))?;
        Ok(Membership::new(client))
    }

    /// Add a client to the member set.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Closed`] if the room is shutting down.
    pub fn join(&self, client: Arc<Client>) -> Result<(), RoomError> {
        if !self.is_running() {
            return Err(RoomError::Closed(self.code.clone()));
        }

        let id = client.id().clone();
        self.members.insert(id.clone(), client);

        // Shutdown may have cleared the member set between the check and the insert.
        if !self.is_running() {
            self.members.remove(&id);
            return Err(RoomError::Closed(self.code.clone()));
        }
        self.membership_changed.notify_one();

        debug!(
            room = %self.code,
            client = %id,
            members = self.members.len(),
            "Client joined"
        );
        Ok(())
    }

    /// Remove a client from the member set and close its connection.
    ///
    /// Returns `true` if the client was a member. Leaving twice is harmless.
    pub async fn leave(&self, client: &Client) -> bool {
        let removed = self.remove_member(client.id()).is_some();
        client.close().await;
        removed
    }

    /// Remove a member without touching its connection.
    pub(crate) fn remove_member(&self, id: &ConnectionId) -> Option<Arc<Client>> {
        let removed = self.members.remove(id).map(|(_, client)| client);
        if removed.is_some() {
            self.membership_changed.notify_one();
            debug!(
                room = %self.code,
                client = %id,
                members = self.members.len(),
                "Client left"
            );
        }
        removed
    }

    /// Queue a message for broadcast.
    ///
    /// Waits while the queue is full; there is no timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Closed`] if the room is shutting down.
    pub async fn post(&self, message: BroadcastMessage) -> Result<(), RoomError> {
        if !self.is_running() {
            return Err(RoomError::Closed(self.code.clone()));
        }
        self.inbound
            .send(message)
            .await
            .map_err(|_| RoomError::Closed(self.code.clone()))?;
        self.counters.message_posted();
        Ok(())
    }

    /// Fire the quit signal. Only the first call has an effect.
    ///
    /// Returns `true` if this call moved the room out of `Running`.
    pub fn quit(&self) -> bool {
        let fired = self
            .state
            .compare_exchange(
                RoomState::Running as u8,
                RoomState::Terminating as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if fired {
            info!(room = %self.code, "Room quit requested");
            self.quit.notify_one();
        }
        fired
    }

    /// The worker loop.
    async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<BroadcastMessage>,
        registry: Option<WeakRegistry>,
        reap_empty_after: Option<Duration>,
    ) {
        info!(room = %self.code, "Room worker started");

        loop {
            let reap = async {
                match reap_empty_after {
                    Some(delay) if self.members.is_empty() => tokio::time::sleep(delay).await,
                    _ => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                _ = self.quit.notified() => break,

                _ = self.membership_changed.notified() => {
                    // Re-arm the idle timer against the new membership.
                }

                message = inbound.recv() => match message {
                    // A recipient that never drains must not hold off quit.
                    Some(message) => tokio::select! {
                        biased;
                        _ = self.quit.notified() => {
                            // The interrupted message counts as dropped.
                            self.counters.dropped(1);
                            break;
                        }
                        () = self.broadcast(message) => {}
                    },
                    None => break,
                },

                _ = reap => {
                    if self.members.is_empty() {
                        info!(room = %self.code, "Reaping empty room");
                        self.quit();
                    }
                }
            }
        }

        self.shutdown(inbound, registry).await;
    }

    /// Deliver one message to every member except its sender.
    async fn broadcast(&self, message: BroadcastMessage) {
        let recipients: Vec<Arc<Client>> = self
            .members
            .iter()
            .filter(|e| e.key() != &message.sender)
            .map(|e| Arc::clone(e.value()))
            .collect();

        if recipients.is_empty() {
            trace!(room = %self.code, message = message.id, "No recipients");
            return;
        }

        let size = message.payload_size();
        let results = join_all(
            recipients
                .iter()
                .map(|client| client.send(message.payload.clone())),
        )
        .await;

        let mut delivered = 0usize;
        for (client, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => {
                    delivered += 1;
                    self.counters.delivered(size);
                }
                Err(e) => {
                    self.counters.delivery_failed();
                    warn!(
                        room = %self.code,
                        client = %client.id(),
                        error = %e,
                        "Delivery failed"
                    );
                }
            }
        }

        trace!(
            room = %self.code,
            message = message.id,
            recipients = recipients.len(),
            delivered,
            "Broadcast complete"
        );
    }

    async fn shutdown(&self, mut inbound: mpsc::Receiver<BroadcastMessage>, registry: Option<WeakRegistry>) {
        self.state
            .store(RoomState::Terminating as u8, Ordering::SeqCst);

        if let Some(registry) = registry {
            registry.deregister(self);
        }

        inbound.close();
        let mut dropped = 0u64;
        while inbound.try_recv().is_ok() {
            dropped += 1;
        }
        drop(inbound);
        if dropped > 0 {
            self.counters.dropped(dropped);
            debug!(room = %self.code, dropped, "Dropped queued messages on shutdown");
        }

        let remaining = self.members();
        self.members.clear();
        for client in &remaining {
            client.close().await;
        }

        self.state.store(RoomState::Deleted as u8, Ordering::SeqCst);
        self.counters.room_deleted();
        info!(
            room = %self.code,
            disconnected = remaining.len(),
            "Room worker stopped"
        );
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("code", &self.code)
            .field("state", &self.state())
            .field("members", &self.members.len())
            .finish()
    }
}
