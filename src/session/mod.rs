//! Relay session handling
//!
//! One session per accepted connection. A session is classified by its first
//! message and then runs either the producer loop (relay frames) or the
//! subscriber loop (answer list requests) until the peer disconnects.

pub mod context;
pub mod handler;
pub mod state;

pub use context::SessionContext;
pub use handler::{Inbound, LoopEnd, RejectReason, SessionHandler, SessionOutcome};
pub use state::{SessionPhase, SessionState};
