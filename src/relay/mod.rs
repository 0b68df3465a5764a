//! Producer to subscriber relay
//!
//! - [`message`]: identification, control and list messages
//! - [`fanout`]: best-effort delivery to all subscribers
//! - [`hub`]: the lock that serializes registry changes and their broadcasts

pub mod fanout;
pub mod hub;
pub mod message;

pub use fanout::DeliveryReport;
pub use hub::RelayHub;
pub use message::{ControlMessage, Identification, RelayEvent};
