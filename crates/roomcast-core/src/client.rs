//! Connected clients and their room membership.
//!
//! A [`Client`] owns one connection. Writes go through a per-client lock so
//! the room worker and the owner closing the connection never interleave.
//! A [`Membership`] is the scoped proof that a client is in a room: its
//! receive loop posts inbound payloads to the room, and however that loop
//! ends the client leaves the room.

use roomcast_transport::{Connection, ConnectionId, Payload, TransportError};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::message::BroadcastMessage;
use crate::room::{Room, RoomHandle};

/// One connected participant.
pub struct Client {
    id: ConnectionId,
    connection: Box<dyn Connection>,
    room: Weak<Room>,
    write_lock: Mutex<()>,
    joined_at: Instant,
}

impl Client {
    pub(crate) fn new(connection: Box<dyn Connection>, room: &RoomHandle) -> Self {
        Self {
            id: connection.id().clone(),
            connection,
            room: Arc::downgrade(room),
            write_lock: Mutex::new(()),
            joined_at: Instant::now(),
        }
    }

    /// Get the client's identifier (its connection ID).
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Describe the remote peer.
    #[must_use]
    pub fn remote_id(&self) -> String {
        self.connection.remote_id()
    }

    /// Check if the underlying connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// How long the client has been in its room.
    #[must_use]
    pub fn connected_for(&self) -> Duration {
        self.joined_at.elapsed()
    }

    /// The room this client belongs to, if it still exists.
    #[must_use]
    pub fn room(&self) -> Option<RoomHandle> {
        self.room.upgrade()
    }

    /// Write a payload to this client.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the write fails.
    pub async fn send(&self, payload: Payload) -> Result<(), TransportError> {
        let _guard = self.write_lock.lock().await;
        self.connection.send(payload).await
    }

    /// Close the connection. Errors are logged, never returned.
    pub(crate) async fn close(&self) {
        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.connection.close().await {
            debug!(client = %self.id, error = %e, "Error while closing connection");
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("remote", &self.connection.remote_id())
            .field("open", &self.connection.is_open())
            .finish()
    }
}

/// Why a client's receive loop ended.
#[derive(Debug)]
pub enum ClientExit {
    /// The peer closed the connection.
    Disconnected,
    /// The room shut down underneath the client.
    RoomClosed,
    /// Reading from the connection failed.
    ReadFailed(TransportError),
}

/// A client's membership in a room.
///
/// Created by [`Room::attach`]. Dropping it without calling [`Membership::run`]
/// or [`Membership::leave`] still removes the client from the room and
/// schedules the connection close.
#[must_use = "dropping a membership removes the client from its room"]
pub struct Membership {
    client: Arc<Client>,
    released: bool,
}

impl Membership {
    pub(crate) fn new(client: Arc<Client>) -> Self {
        Self {
            client,
            released: false,
        }
    }

    /// The client holding this membership.
    #[must_use]
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Forward everything the client sends into its room until the connection
    /// ends, then leave the room.
    pub async fn run(mut self) -> ClientExit {
        let exit = self.receive_loop().await;
        self.release().await;
        exit
    }

    /// Leave the room now.
    pub async fn leave(mut self) {
        self.release().await;
    }

    async fn receive_loop(&self) -> ClientExit {
        let client = &self.client;
        loop {
            match client.connection.recv().await {
                Ok(Some(payload)) => {
                    let Some(room) = client.room() else {
                        return ClientExit::RoomClosed;
                    };
                    let message = BroadcastMessage::new(client.id.clone(), payload);
                    if room.post(message).await.is_err() {
                        debug!(client = %client.id, room = %room.code(), "Room closed, ending receive loop");
                        return ClientExit::RoomClosed;
                    }
                }
                Ok(None) => {
                    debug!(client = %client.id, "Connection closed by peer");
                    return ClientExit::Disconnected;
                }
                Err(e) => {
                    warn!(client = %client.id, error = %e, "Receive failed");
                    return ClientExit::ReadFailed(e);
                }
            }
        }
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.client.room() {
            Some(room) => {
                room.leave(&self.client).await;
            }
            None => self.client.close().await,
        }
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Some(room) = self.client.room() {
            room.remove_member(&self.client.id);
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = Arc::clone(&self.client);
            handle.spawn(async move { client.close().await });
        }
    }
}
