//! Screen stream relay
//!
//! A WebSocket relay that lets producers push binary frames to any number of
//! viewers, and keeps every viewer informed of which producers are live.
//!
//! # Protocol
//!
//! Every connection identifies itself with its first text message:
//!
//! - `STREAMER:<name>` registers a producer. Each binary message it sends
//!   afterwards is relayed verbatim to all subscribers.
//! - `CLIENT` registers a subscriber. It immediately receives
//!   `{"type":"pc_list","pcs":[...]}` and receives it again whenever the set of
//!   producers changes. Sending `get_pcs` requests an immediate re-send.
//!
//! Anything else is closed with code 1008.
//!
//! # Example
//!
//! ```no_run
//! use screen_relay::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> screen_relay::Result<()> {
//!     let config = ServerConfig::default().max_connections(500);
//!     let server = RelayServer::new(config);
//!     server.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await
//! }
//! ```

pub mod error;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, ProducerDirectory, Role};
pub use relay::{RelayEvent, RelayHub};
pub use server::{RelayServer, ServerConfig};
pub use session::{SessionHandler, SessionOutcome};
pub use stats::{RelayStats, StatsSnapshot};
