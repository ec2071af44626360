//! Main application logic and lifecycle management.
//!
//! This module contains the core `Application` struct that orchestrates
//! server startup, monitoring, and shutdown.

use crate::{cli::CliArgs, config::AppConfig, logging::display_banner, signals::wait_for_shutdown};
use std::sync::Arc;
use tracing::{error, info, warn};
use vantage_server::GameServer;

/// Main application struct.
///
/// Manages the complete lifecycle of the Vantage server: configuration
/// loading, server initialization, session monitoring, and graceful
/// shutdown handling.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Game server instance
    server: Arc<GameServer>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// Loads configuration, applies CLI overrides, validates settings, and
    /// initializes the game server.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Initialize game server with configuration
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }
        if let Some(state_file) = args.state_file {
            config.persistence.path = state_file.to_string_lossy().to_string();
        }
        if args.no_persist {
            config.persistence.enabled = false;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server_config = config.to_server_config()?;
        let server = Arc::new(GameServer::new(server_config));

        Ok(Self { config, server })
    }

    /// Runs the application until a shutdown signal arrives.
    ///
    /// Starts the server in the background, waits for SIGINT/SIGTERM, then
    /// drives graceful shutdown: the accept loop stops, in-flight battles
    /// are joined, and a final persistence save is taken before exit.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.log_configuration_summary();

        let server = Arc::clone(&self.server);
        let server_handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("❌ Server error: {:?}", e);
                std::process::exit(1);
            }
        });

        info!("✅ Vantage Server is now running!");
        info!("🎮 Ready to accept connections on {}", self.config.server.bind_address);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        wait_for_shutdown().await?;

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");
        self.server.shutdown().await?;

        // The server joins active battles and saves the world on its way
        // out; give it a bounded window before letting the process die.
        match tokio::time::timeout(tokio::time::Duration::from_secs(8), server_handle).await {
            Ok(_) => info!("✅ Server task completed gracefully"),
            Err(_) => warn!("⏰ Server task did not complete within timeout, exiting anyway"),
        }

        info!("✅ Vantage Server shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!(
            "  💓 Keepalive: ping every {}s, pong deadline {}s",
            self.config.server.ping_interval_secs, self.config.server.ping_timeout_secs
        );
        info!(
            "  📡 Broadcast throttle: {}s",
            self.config.server.broadcast_throttle_secs
        );
        if self.config.persistence.enabled {
            info!("  💾 State blob: {}", self.config.persistence.path);
        } else {
            info!("  💾 Persistence disabled");
        }
    }
}
