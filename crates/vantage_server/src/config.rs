//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the game server behavior.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration structure for the game server.
///
/// Contains all necessary parameters to configure server behavior including
/// network settings, keepalive timing, broadcast throttling, and battle
/// pacing. Durations are stored as plain integers so the structure
/// round-trips through TOML without custom serializers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Delay in milliseconds before a new session finishes its handshake.
    /// Absorbs rapid reconnect storms from flaky clients.
    pub connect_grace_ms: u64,

    /// Interval in seconds between keepalive pings
    pub ping_interval_secs: u64,

    /// Deadline in seconds for a pong after a ping was sent
    pub ping_timeout_secs: u64,

    /// Minimum interval in seconds between two `game_state_update`
    /// broadcasts to the same player; pushes inside the window are dropped
    pub broadcast_throttle_secs: u64,

    /// Interval in milliseconds between battle simulation ticks
    pub battle_tick_ms: u64,

    /// Optional path of the flat-file state blob. `None` disables
    /// persistence entirely.
    pub persist_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Keepalive ping interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Keepalive pong deadline as a [`Duration`].
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    /// Broadcast throttle window as a [`Duration`].
    pub fn broadcast_throttle(&self) -> Duration {
        Duration::from_secs(self.broadcast_throttle_secs)
    }

    /// Battle tick interval as a [`Duration`].
    pub fn battle_tick(&self) -> Duration {
        Duration::from_millis(self.battle_tick_ms)
    }

    /// Handshake grace delay as a [`Duration`].
    pub fn connect_grace(&self) -> Duration {
        Duration::from_millis(self.connect_grace_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".parse().expect("Invalid default bind address"),
            max_connections: 1000,
            connect_grace_ms: 100,
            ping_interval_secs: 45,
            ping_timeout_secs: 15,
            broadcast_throttle_secs: 300,
            battle_tick_ms: 500,
            persist_path: Some(PathBuf::from("server_state.json")),
        }
    }
}
