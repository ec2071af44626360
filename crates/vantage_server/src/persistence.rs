//! Best-effort flat-file persistence.
//!
//! The world store serializes to a single JSON blob, loaded once at startup
//! and rewritten after mutating commands. Both directions are strictly
//! best-effort: a missing or corrupt file at load time means a fresh world,
//! and a failed save is logged and forgotten. Nothing in the serving path
//! ever fails because of persistence.

use crate::world::WorldState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Handle on the flat-file state blob.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Attempts to load a previously persisted world.
    ///
    /// Returns `None` when the file is absent or unreadable; the caller
    /// falls back to generating a fresh world.
    pub async fn load(&self) -> Option<WorldState> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Persistence load skipped: {e}");
                return None;
            }
        };
        match serde_json::from_slice::<WorldState>(&bytes) {
            Ok(world) => {
                info!("💾 Restored world state from {}", self.path.display());
                Some(world)
            }
            Err(e) => {
                debug!("Persistence load failed: {e}");
                None
            }
        }
    }

    /// Writes the current world to disk. Failures are logged only.
    pub async fn save(&self, world: &Arc<RwLock<WorldState>>) {
        let bytes = {
            let world = world.read().await;
            match serde_json::to_vec(&*world) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("Persistence save failed to serialize: {e}");
                    return;
                }
            }
        };
        if let Err(e) = tokio::fs::write(&self.path, bytes).await {
            debug!("Persistence save failed: {e}");
        }
    }
}
