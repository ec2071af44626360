//! # Vantage Server - Persistent-World RTS Core
//!
//! The authoritative server for a persistent-world real-time strategy game.
//! Players hold a long-lived WebSocket session, control planets, harvest
//! resources, run missions, and fight asynchronous battles whose outcome is
//! gated by a composite leverage multiplier.
//!
//! ## Architecture Overview
//!
//! * **Session Registry** - connection lifecycle, identity deduplication
//!   (one live session per player identity), and keepalive supervision
//! * **Scoring Engine** - aggregates capped progress signals into a
//!   multiplier bounded to `[1.0, 2.0]`, pruning expired buffs on read
//! * **Battle Coordinator** - per-target-exclusive, time-extended combat
//!   simulations over shared world state
//! * **State Broadcaster** - throttled `game_state_update` snapshots
//! * **World / Persistence** - single `RwLock`-guarded store with a
//!   best-effort flat-file blob
//!
//! ## Message Flow
//!
//! 1. Client connects and sends a `{type, payload}` envelope with its
//!    opaque identity (`connect`)
//! 2. Commands are routed to handlers; every handler failure becomes one
//!    `error` event - nothing crashes the session loop
//! 3. Handlers mutate the world, emit result events, and push throttled
//!    snapshots back through the registry
//!
//! ## Concurrency Model
//!
//! Everything multiplexes cooperatively on the tokio runtime: sessions,
//! keepalive loops, and battle simulations are tasks, never OS threads.
//! Critical sections complete between suspension points; the single
//! mandatory mutual-exclusion invariant - one unresolved battle per target
//! planet - is enforced by an atomically checked-and-inserted active set.

// Re-export core types and functions for easy access
pub use config::ServerConfig;
pub use error::{GameError, ServerError};
pub use server::{GameContext, GameServer};
pub use utils::{create_server, create_server_with_config};

// Public module declarations
pub mod broadcast;
pub mod combat;
pub mod config;
pub mod error;
pub mod messaging;
pub mod persistence;
pub mod scoring;
pub mod server;
pub mod session;
pub mod utils;
pub mod world;
