//! Relay server
//!
//! - [`config`]: server options
//! - [`listener`]: HTTP router and accept loop
//! - [`ws`]: WebSocket to session bridge

pub mod config;
pub mod listener;
pub mod ws;

pub use config::ServerConfig;
pub use listener::RelayServer;
