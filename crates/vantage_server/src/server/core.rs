//! Core game server implementation.
//!
//! This module contains the main [`GameServer`] struct and its
//! implementation, wiring together the session registry, scoring, battle
//! coordination, broadcasting, and persistence into one accept loop.
//!
//! # Architecture
//!
//! * **Session Registry**: WebSocket lifecycle, identity dedup, keepalive
//! * **World Store**: single `RwLock`-guarded state shared by all handlers
//! * **Battle Coordinator**: per-target-exclusive combat simulations
//! * **State Broadcaster**: throttled outbound snapshots
//! * **Persistence**: best-effort flat-file blob, loaded once at startup

use crate::{
    broadcast::StateBroadcaster,
    combat::BattleCoordinator,
    config::ServerConfig,
    error::ServerError,
    persistence::StateStore,
    server::handlers::handle_connection,
    session::SessionRegistry,
    world::{generator, WorldState},
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

/// Shared handles every command handler and connection task works with.
///
/// One `Arc<GameContext>` is cloned into each spawned connection; nothing
/// in here is connection-specific.
pub struct GameContext {
    pub config: ServerConfig,
    pub world: Arc<RwLock<WorldState>>,
    pub registry: Arc<SessionRegistry>,
    pub coordinator: Arc<BattleCoordinator>,
    pub broadcaster: Arc<StateBroadcaster>,
    pub store: Option<Arc<StateStore>>,
}

/// The core game server structure.
pub struct GameServer {
    ctx: Arc<GameContext>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl GameServer {
    /// Creates a new game server with the specified configuration.
    ///
    /// All components are constructed and wired here; the world itself is
    /// populated lazily by [`GameServer::start`] (restored from the
    /// persistence blob when available, freshly generated otherwise).
    pub fn new(config: ServerConfig) -> Self {
        let world = Arc::new(RwLock::new(WorldState::default()));
        let registry = Arc::new(SessionRegistry::new(
            config.ping_interval(),
            config.ping_timeout(),
            config.connect_grace(),
        ));
        let broadcaster = Arc::new(StateBroadcaster::new(
            Arc::clone(&world),
            Arc::clone(&registry),
            config.broadcast_throttle(),
        ));
        let store = config
            .persist_path
            .clone()
            .map(|path| Arc::new(StateStore::new(path)));
        let coordinator = Arc::new(
            BattleCoordinator::new(Arc::clone(&world), Arc::clone(&registry), config.battle_tick())
                .with_services(Arc::clone(&broadcaster), store.clone()),
        );
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            ctx: Arc::new(GameContext {
                config,
                world,
                registry,
                coordinator,
                broadcaster,
                store,
            }),
            shutdown_sender,
        }
    }

    /// Populates the world store: restores the persisted blob when one
    /// loads, otherwise generates a fresh universe.
    pub async fn initialize_world(&self) {
        let restored = match &self.ctx.store {
            Some(store) => store.load().await,
            None => None,
        };

        let mut world = self.ctx.world.write().await;
        match restored {
            Some(state) => *world = state,
            None => {
                let mut rng = StdRng::from_entropy();
                world.universe = generator::generate_universe(&mut rng);
                info!(
                    "🌌 Generated fresh universe with {} planets",
                    world.universe.planets().count()
                );
            }
        }
    }

    /// Starts the game server and begins accepting connections.
    ///
    /// # Startup Sequence
    ///
    /// 1. Initialize the world (restore or generate)
    /// 2. Bind the TCP listener
    /// 3. Accept connections, spawning one handler task per client
    /// 4. Run until the internal shutdown signal fires
    /// 5. Join every in-flight battle, then take a final persistence save
    ///
    /// # Returns
    ///
    /// `Ok(())` if the server started and stopped cleanly, or a
    /// `ServerError` if there was a failure during startup.
    pub async fn start(&self) -> Result<(), ServerError> {
        info!("🚀 Starting game server on {}", self.ctx.config.bind_address);
        self.initialize_world().await;

        let listener = TcpListener::bind(self.ctx.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind listener: {e}")))?;

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            if self.ctx.registry.session_count().await >= self.ctx.config.max_connections {
                                warn!("Connection limit reached, refusing {}", addr);
                                continue;
                            }
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, ctx).await {
                                    error!("Connection error: {:?}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            break;
                        }
                    }
                }
                _ = shutdown_receiver.recv() => {
                    info!("Internal shutdown signal received");
                    break;
                }
            }
        }

        // Orderly shutdown: battles have no cancellation API, so wait for
        // every registered battle task before the final save.
        info!("🧹 Performing server cleanup...");
        self.ctx.coordinator.join_active().await;
        if let Some(store) = &self.ctx.store {
            store.save(&self.ctx.world).await;
        }
        info!("Server stopped");
        Ok(())
    }

    /// Initiates server shutdown.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    /// Gets the shared context for tests and embedding callers.
    pub fn context(&self) -> Arc<GameContext> {
        Arc::clone(&self.ctx)
    }
}
