//! Connection registry for producer/subscriber routing
//!
//! The registry records which live connections are producers and which are
//! subscribers, and derives the producer directory from the producer roles.
//!
//! # Architecture
//!
//! ```text
//!                    ConnectionRegistry
//!          ┌──────────────────────────────────────┐
//!          │ roles:       ConnectionId -> Role    │
//!          │ directory:   name -> ConnectionHandle│
//!          │ subscribers: ConnectionId -> Handle  │
//!          └──────────────────┬───────────────────┘
//!                             │
//!          ┌──────────────────┼──────────────────┐
//!          ▼                  ▼                  ▼
//!     [Producer]         [Subscriber]       [Subscriber]
//!     register()         handle.send_*()    handle.send_*()
//!                             │                  │
//!                         mpsc queue         mpsc queue ──► writer task ──► WebSocket
//! ```
//!
//! Handles enqueue onto a bounded per-connection queue, so delivering to a
//! subscriber never waits on its socket.

pub mod connection;
pub mod directory;
pub mod error;
pub mod store;

pub use connection::{ConnectionHandle, ConnectionId, Outbound, Role};
pub use directory::ProducerDirectory;
pub use error::SendError;
pub use store::{ConnectionRegistry, Removal};
