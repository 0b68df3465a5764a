//! Registry error types
//!
//! Error types for delivering data to registered connections.

use thiserror::Error;

use super::connection::ConnectionId;

/// Error returned when a message cannot be queued for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection's outbound queue is full (slow consumer)
    #[error("outbound queue full: {0}")]
    QueueFull(ConnectionId),
    /// The connection's writer has shut down
    #[error("connection closed: {0}")]
    Closed(ConnectionId),
}
