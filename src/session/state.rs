//! Session state machine
//!
//! Tracks a relay session from accept to close.

use std::net::SocketAddr;
use std::time::Instant;

use crate::registry::{ConnectionId, Role};
use crate::stats::SessionStats;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport accepted, handler not reading yet
    Connecting,
    /// Waiting for the identification message
    Unclassified,
    /// Relaying frames from this producer
    Producer,
    /// Delivering frames and lists to this subscriber
    Subscriber,
    /// Session ended; no further operations
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Connection identity
    pub id: ConnectionId,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Role assigned at classification
    pub role: Option<Role>,

    /// Connection start time
    pub connected_at: Instant,

    /// Inbound counters
    pub stats: SessionStats,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Connecting,
            role: None,
            connected_at: Instant::now(),
            stats: SessionStats::new(),
        }
    }

    /// Begin waiting for the identification message
    pub fn await_identification(&mut self) {
        if self.phase == SessionPhase::Connecting {
            self.phase = SessionPhase::Unclassified;
        }
    }

    /// Classify as a producer
    ///
    /// Returns `false` (and changes nothing) unless the session is unclassified.
    pub fn classify_producer(&mut self, name: &str) -> bool {
        self.classify(SessionPhase::Producer, Role::Producer(name.to_string()))
    }

    /// Classify as a subscriber
    ///
    /// Returns `false` (and changes nothing) unless the session is unclassified.
    pub fn classify_subscriber(&mut self) -> bool {
        self.classify(SessionPhase::Subscriber, Role::Subscriber)
    }

    fn classify(&mut self, phase: SessionPhase, role: Role) -> bool {
        if self.phase != SessionPhase::Unclassified {
            return false;
        }
        self.phase = phase;
        self.role = Some(role);
        true
    }

    /// Record a frame received from a producer
    pub fn on_frame(&mut self, size: usize) {
        self.stats.frames_received += 1;
        self.stats.bytes_received += size as u64;
    }

    /// Record a producer list request
    pub fn on_list_request(&mut self) {
        self.stats.list_requests += 1;
    }

    /// Close the session
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
        self.stats.duration = self.duration();
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
