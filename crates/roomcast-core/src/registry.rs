//! The room registry.
//!
//! Maps room codes to running rooms. Only [`RoomRegistry::create`],
//! [`RoomRegistry::lookup`] and [`RoomRegistry::delete`] touch the map; room
//! traffic never takes a registry lock.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::code::{CodeError, RoomCode, RoomCodeGenerator, DEFAULT_CODE_LENGTH};
use crate::room::{Room, RoomConfig, RoomHandle};
use crate::stats::{CounterSnapshot, RelayCounters};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A live room already uses this code.
    #[error("Room already exists: {0}")]
    RoomAlreadyExists(RoomCode),

    /// No live room uses this code.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// The requested code was blank.
    #[error("Room code cannot be empty")]
    EmptyRoomCode,

    /// The requested code is not a valid room code.
    #[error("Invalid room code: {0}")]
    InvalidRoomCode(CodeError),

    /// The configured room limit has been reached.
    #[error("Maximum number of rooms ({0}) reached")]
    TooManyRooms(usize),
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of live rooms.
    pub max_rooms: usize,
    /// Length of generated room codes.
    pub code_length: usize,
    /// Settings applied to every new room.
    pub room: RoomConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_rooms: 10_000,
            code_length: DEFAULT_CODE_LENGTH,
            room: RoomConfig::default(),
        }
    }
}

struct RegistryInner {
    rooms: DashMap<RoomCode, RoomHandle>,
    /// Registered rooms plus in-flight creates; bounded by `max_rooms`.
    slots: AtomicUsize,
    generator: RoomCodeGenerator,
    config: RegistryConfig,
    counters: Arc<RelayCounters>,
}

impl RegistryInner {
    fn release_slot(&self) {
        self.slots.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Directory of live rooms.
///
/// Cheap to clone; all clones share the same map.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RegistryInner>,
}

/// Non-owning registry reference held by room workers.
pub(crate) struct WeakRegistry(Weak<RegistryInner>);

impl WeakRegistry {
    /// Remove `room` from the registry if it is still the entry for its code.
    pub(crate) fn deregister(&self, room: &Room) {
        let Some(inner) = self.0.upgrade() else {
            return;
        };
        let removed = inner
            .rooms
            .remove_if(room.code(), |_, entry| std::ptr::eq(Arc::as_ptr(entry), room));
        if removed.is_some() {
            inner.release_slot();
            debug!(room = %room.code(), "Room deregistered by its worker");
        }
    }
}

impl RoomRegistry {
    /// Create a registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating room registry with config: {:?}", config);
        Self {
            inner: Arc::new(RegistryInner {
                rooms: DashMap::new(),
                slots: AtomicUsize::new(0),
                generator: RoomCodeGenerator::new(config.code_length),
                config,
                counters: Arc::new(RelayCounters::default()),
            }),
        }
    }

    /// Register a new room under `code` and start its worker.
    ///
    /// The existence check and the insert happen under the same map lock, so
    /// two concurrent calls with the same code cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoomAlreadyExists`] if the code is taken and
    /// [`RegistryError::TooManyRooms`] if the limit is reached. The limit is
    /// reserved before the map is touched, so concurrent creates never
    /// overshoot it.
    pub fn create(&self, code: RoomCode) -> Result<RoomHandle, RegistryError> {
        let max = self.inner.config.max_rooms;
        let reserved = self
            .inner
            .slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1));
        if reserved.is_err() {
            warn!(max, "Room limit reached");
            return Err(RegistryError::TooManyRooms(max));
        }

        match self.inner.rooms.entry(code) {
            Entry::Occupied(entry) => {
                self.inner.release_slot();
                Err(RegistryError::RoomAlreadyExists(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                let room = Room::spawn_inner(
                    entry.key().clone(),
                    self.inner.config.room.clone(),
                    Arc::clone(&self.inner.counters),
                    Some(WeakRegistry(Arc::downgrade(&self.inner))),
                );
                entry.insert(Arc::clone(&room));
                info!(room = %room.code(), rooms = self.inner.rooms.len(), "Room created");
                Ok(room)
            }
        }
    }

    /// Register a room under a freshly generated code.
    ///
    /// The code is drawn once; a collision is reported, not retried.
    ///
    /// # Errors
    ///
    /// Same as [`RoomRegistry::create`].
    pub fn create_with_generated_code(&self) -> Result<RoomHandle, RegistryError> {
        let code = self.inner.generator.generate();
        self.create(code)
    }

    /// Look up a live room.
    #[must_use]
    pub fn lookup(&self, code: &RoomCode) -> Option<RoomHandle> {
        self.inner.rooms.get(code).map(|entry| Arc::clone(entry.value()))
    }

    /// Parse a user-supplied code and look the room up.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyRoomCode`] for a blank code,
    /// [`RegistryError::InvalidRoomCode`] for a malformed one and
    /// [`RegistryError::RoomNotFound`] if no live room matches.
    pub fn resolve(&self, raw: &str) -> Result<RoomHandle, RegistryError> {
        let code = RoomCode::parse(raw).map_err(|e| match e {
            CodeError::Empty => RegistryError::EmptyRoomCode,
            other => RegistryError::InvalidRoomCode(other),
        })?;
        self.lookup(&code)
            .filter(|room| room.is_running())
            .ok_or_else(|| RegistryError::RoomNotFound(code.to_string()))
    }

    /// Remove a room and tell it to quit. Does nothing if the code is absent.
    ///
    /// Returns the removed room.
    pub fn delete(&self, code: &RoomCode) -> Option<RoomHandle> {
        let (_, room) = self.inner.rooms.remove(code)?;
        self.inner.release_slot();
        room.quit();
        info!(room = %code, rooms = self.inner.rooms.len(), "Room deleted");
        Some(room)
    }

    /// Delete every room.
    pub fn shutdown(&self) {
        let codes = self.codes();
        for code in &codes {
            self.delete(code);
        }
        info!(rooms = codes.len(), "Registry shut down");
    }

    /// Number of live rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.rooms.len()
    }

    /// Check if there are no live rooms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.rooms.is_empty()
    }

    /// Check if a room exists.
    #[must_use]
    pub fn contains(&self, code: &RoomCode) -> bool {
        self.inner.rooms.contains_key(code)
    }

    /// Sorted list of live room codes.
    #[must_use]
    pub fn codes(&self) -> Vec<RoomCode> {
        let mut codes: Vec<RoomCode> = self.inner.rooms.iter().map(|e| e.key().clone()).collect();
        codes.sort();
        codes
    }

    /// Relay-wide counters.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.inner.counters.snapshot()
    }

    /// The configuration this registry was built with.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
