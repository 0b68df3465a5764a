//! Relay and session statistics

pub mod metrics;

pub use metrics::{RelayStats, SessionStats, StatsSnapshot};
