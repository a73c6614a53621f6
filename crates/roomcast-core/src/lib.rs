//! # roomcast-core
//!
//! The room broadcast engine for the roomcast relay.
//!
//! - **RoomRegistry** - directory of live rooms keyed by code
//! - **Room** - one actor per room that fans messages out to its members
//! - **Client** / **Membership** - a connection attached to exactly one room
//! - **RoomCodeGenerator** - short codes for new rooms
//! - **AdminInspector** - read-only snapshots for operators
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ post  ┌─────────────┐ send  ┌─────────────┐
//! │ Membership  │──────▶│ Room worker │──────▶│   Clients   │
//! │ (recv loop) │       └─────────────┘       └─────────────┘
//! └─────────────┘              ▲
//!        │ resolve             │ create / delete
//!        ▼                     │
//! ┌──────────────────────────────┐
//! │         RoomRegistry         │
//! └──────────────────────────────┘
//! ```

pub mod client;
pub mod code;
pub mod inspector;
pub mod message;
pub mod registry;
pub mod room;
pub mod stats;

pub use client::{Client, ClientExit, Membership};
pub use code::{CodeError, RoomCode, RoomCodeGenerator};
pub use inspector::{AdminInspector, MemberInfo, RelayStats, RoomSummary};
pub use message::BroadcastMessage;
pub use registry::{RegistryConfig, RegistryError, RoomRegistry};
pub use room::{Room, RoomConfig, RoomError, RoomHandle, RoomState};
pub use stats::CounterSnapshot;
