//! Session context
//!
//! Identity and settings handed to a session when its connection is accepted.

use std::net::SocketAddr;
use std::time::Duration;

use crate::registry::ConnectionId;

/// Per-connection context built by the server
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique connection ID
    pub connection_id: ConnectionId,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Maximum wait for the identification message (`None` waits forever)
    pub identify_timeout: Option<Duration>,
}

impl SessionContext {
    /// Create a new context with no identification timeout
    pub fn new(connection_id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self {
            connection_id,
            peer_addr,
            identify_timeout: None,
        }
    }

    /// Bound the wait for the identification message
    pub fn identify_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.identify_timeout = timeout;
        self
    }
}
