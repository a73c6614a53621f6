//! # roomcast-transport
//!
//! Connection abstraction for the roomcast relay.
//!
//! The room engine is written against the [`Connection`] trait and never sees
//! a socket directly:
//!
//! - **WebSocket** - connections upgraded by axum (feature `websocket`)
//! - **Memory** - in-process pairs for tests and benchmarks
//!
//! ```rust,ignore
//! use roomcast_transport::Connection;
//!
//! async fn echo(conn: &dyn Connection) {
//!     while let Ok(Some(payload)) = conn.recv().await {
//!         let _ = conn.send(payload).await;
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryConnection, MemoryPeer};
pub use traits::{Connection, ConnectionId, Payload, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;
