//! Configuration management for the Vantage game server.
//!
//! This module handles loading, validation, and conversion of server
//! configuration from TOML files and command-line arguments.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use vantage_server::ServerConfig;

fn default_max_connections() -> usize {
    1000
}

fn default_connect_grace_ms() -> u64 {
    100
}

fn default_ping_interval_secs() -> u64 {
    45
}

fn default_ping_timeout_secs() -> u64 {
    15
}

fn default_broadcast_throttle_secs() -> u64 {
    300
}

fn default_battle_tick_ms() -> u64 {
    500
}

fn default_persist_enabled() -> bool {
    true
}

fn default_persist_path() -> String {
    "server_state.json".to_string()
}

/// Application configuration loaded from TOML file.
///
/// This is the main configuration structure that encompasses all server
/// settings including networking, session timing, persistence, and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Persistence configuration settings
    #[serde(default)]
    pub persistence: PersistenceSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
///
/// Controls network binding, connection limits, keepalive timing, broadcast
/// throttling, and battle pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Handshake grace delay in milliseconds for reconnect storms
    #[serde(default = "default_connect_grace_ms")]
    pub connect_grace_ms: u64,
    /// Seconds between keepalive pings
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Seconds a pong may lag a ping before eviction
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    /// Minimum seconds between state broadcasts to the same player
    #[serde(default = "default_broadcast_throttle_secs")]
    pub broadcast_throttle_secs: u64,
    /// Milliseconds between battle simulation ticks
    #[serde(default = "default_battle_tick_ms")]
    pub battle_tick_ms: u64,
}

/// Flat-file persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// Whether to load/save the world state blob at all
    #[serde(default = "default_persist_enabled")]
    pub enabled: bool,
    /// Path of the state blob
    #[serde(default = "default_persist_path")]
    pub path: String,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            enabled: default_persist_enabled(),
            path: default_persist_path(),
        }
    }
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    pub file_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:8080".to_string(),
                max_connections: default_max_connections(),
                connect_grace_ms: default_connect_grace_ms(),
                ping_interval_secs: default_ping_interval_secs(),
                ping_timeout_secs: default_ping_timeout_secs(),
                broadcast_throttle_secs: default_broadcast_throttle_secs(),
                battle_tick_ms: default_battle_tick_ms(),
            },
            persistence: PersistenceSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
                file_path: None,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at
    /// the specified path and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config file
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to a game server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            connect_grace_ms: self.server.connect_grace_ms,
            ping_interval_secs: self.server.ping_interval_secs,
            ping_timeout_secs: self.server.ping_timeout_secs,
            broadcast_throttle_secs: self.server.broadcast_throttle_secs,
            battle_tick_ms: self.server.battle_tick_ms,
            persist_path: self
                .persistence
                .enabled
                .then(|| PathBuf::from(&self.persistence.path)),
        })
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.ping_interval_secs == 0 {
            return Err("ping_interval_secs must be greater than 0".to_string());
        }
        if self.server.ping_timeout_secs == 0 {
            return Err("ping_timeout_secs must be greater than 0".to_string());
        }
        if self.server.battle_tick_ms == 0 {
            return Err("battle_tick_ms must be greater than 0".to_string());
        }

        if self.persistence.enabled && self.persistence.path.is_empty() {
            return Err("Persistence path cannot be empty when enabled".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.server.ping_interval_secs, 45);
        assert_eq!(config.server.ping_timeout_secs, 15);
        assert_eq!(config.server.broadcast_throttle_secs, 300);
        assert_eq!(config.server.battle_tick_ms, 500);

        assert!(config.persistence.enabled);
        assert_eq!(config.persistence.path, "server_state.json");

        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.logging.file_path.is_none());
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
bind_address = "0.0.0.0:3000"
max_connections = 2000
ping_interval_secs = 30
ping_timeout_secs = 10
broadcast_throttle_secs = 120
battle_tick_ms = 250

[persistence]
enabled = false

[logging]
level = "debug"
json_format = true
file_path = "/tmp/test.log"
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&temp_file.path().to_path_buf())
            .await
            .unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:3000");
        assert_eq!(config.server.max_connections, 2000);
        assert_eq!(config.server.ping_interval_secs, 30);
        assert_eq!(config.server.broadcast_throttle_secs, 120);
        assert!(!config.persistence.enabled);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[tokio::test]
    async fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert!(path.exists());
    }

    #[test]
    fn test_to_server_config_conversion() {
        let config = AppConfig::default();
        let server_config = config.to_server_config().unwrap();

        assert_eq!(server_config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(server_config.ping_interval_secs, 45);
        assert_eq!(
            server_config.persist_path,
            Some(PathBuf::from("server_state.json"))
        );

        let mut config = AppConfig::default();
        config.persistence.enabled = false;
        let server_config = config.to_server_config().unwrap();
        assert!(server_config.persist_path.is_none());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.server.bind_address = "not-an-address".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid bind address"));

        let mut config = AppConfig::default();
        config.server.ping_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));

        let mut config = AppConfig::default();
        config.persistence.path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_serde_deserialization_with_defaults() {
        let toml_content = r#"
[server]
bind_address = "127.0.0.1:8080"

[logging]
level = "info"
json_format = false
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.server.ping_interval_secs, 45);
        assert_eq!(config.server.battle_tick_ms, 500);
        assert!(config.persistence.enabled);
    }
}
