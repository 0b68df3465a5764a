//! Statistics and metrics for the relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Relay-wide counters
///
/// Updated from every connection task; all counters are relaxed atomics.
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    connections_accepted: AtomicU64,
    sessions_active: AtomicU64,
    sessions_rejected: AtomicU64,
    producers_registered: AtomicU64,
    frames_relayed: AtomicU64,
    frame_deliveries: AtomicU64,
    list_messages_sent: AtomicU64,
    subscribers_pruned: AtomicU64,
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_accepted: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            sessions_rejected: AtomicU64::new(0),
            producers_registered: AtomicU64::new(0),
            frames_relayed: AtomicU64::new(0),
            frame_deliveries: AtomicU64::new(0),
            list_messages_sent: AtomicU64::new(0),
            subscribers_pruned: AtomicU64::new(0),
        }
    }

    pub(crate) fn session_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_closed(&self) {
        // Saturate so an unbalanced close never wraps the gauge
        let _ = self
            .sessions_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub(crate) fn session_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn producer_registered(&self) {
        self.producers_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_relayed(&self, deliveries: usize) {
        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
        self.frame_deliveries
            .fetch_add(deliveries as u64, Ordering::Relaxed);
    }

    pub(crate) fn list_sent(&self, count: usize) {
        self.list_messages_sent
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn subscribers_pruned(&self, count: usize) {
        self.subscribers_pruned
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Time since the counters were created
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.uptime().as_secs(),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            producers_registered: self.producers_registered.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            frame_deliveries: self.frame_deliveries.load(Ordering::Relaxed),
            list_messages_sent: self.list_messages_sent.load(Ordering::Relaxed),
            subscribers_pruned: self.subscribers_pruned.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub connections_accepted: u64,
    pub sessions_active: u64,
    pub sessions_rejected: u64,
    pub producers_registered: u64,
    pub frames_relayed: u64,
    pub frame_deliveries: u64,
    pub list_messages_sent: u64,
    pub subscribers_pruned: u64,
}

/// Per-session counters
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Binary frames received from the peer
    pub frames_received: u64,
    /// Payload bytes received from the peer
    pub bytes_received: u64,
    /// Producer list re-sends requested by the peer
    pub list_requests: u64,
    /// Session duration
    pub duration: Duration,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Inbound bitrate over the session duration (bits/sec)
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }
}
