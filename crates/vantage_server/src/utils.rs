//! Utility functions and helper methods for the game server.
//!
//! This module provides convenient factory functions and small shared
//! helpers used across the server components.

use crate::{config::ServerConfig, server::GameServer};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in seconds.
///
/// Used for temporary-buff expiry stamps and persisted snapshots. Falls back
/// to zero if the system clock is before the epoch, which only happens on a
/// badly misconfigured host.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Creates a new game server with default configuration.
///
/// This is a convenience function for quickly setting up a server
/// with sensible defaults for development and testing.
pub fn create_server() -> GameServer {
    GameServer::new(ServerConfig::default())
}

/// Creates a new game server with custom configuration.
///
/// # Arguments
///
/// * `config` - A `ServerConfig` instance with desired settings
pub fn create_server_with_config(config: ServerConfig) -> GameServer {
    GameServer::new(config)
}
