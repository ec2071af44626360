//! Outbound world/player snapshot assembly with per-player throttling.
//!
//! The broadcaster is the only producer of `game_state_update` frames. A
//! push inside the throttle window of the previous successful push to the
//! same player is dropped outright - never queued - so the next allowed
//! push always carries the then-current snapshot.

use crate::scoring;
use crate::session::SessionRegistry;
use crate::utils::current_timestamp;
use crate::world::{PlayerId, WorldState};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Assembles and rate-limits `game_state_update` snapshots.
pub struct StateBroadcaster {
    world: Arc<RwLock<WorldState>>,
    registry: Arc<SessionRegistry>,
    throttle: Duration,
    last_push: Mutex<HashMap<PlayerId, Instant>>,
}

impl StateBroadcaster {
    pub fn new(
        world: Arc<RwLock<WorldState>>,
        registry: Arc<SessionRegistry>,
        throttle: Duration,
    ) -> Self {
        Self {
            world,
            registry,
            throttle,
            last_push: Mutex::new(HashMap::new()),
        }
    }

    /// Pushes the current game state to the player's live session.
    ///
    /// Returns `true` when a snapshot was delivered. Suppressed (throttled)
    /// and failed deliveries return `false`; only a successful delivery
    /// arms the throttle window.
    pub async fn push(&self, player: &PlayerId) -> bool {
        {
            let last_push = self.last_push.lock().await;
            if let Some(previous) = last_push.get(player) {
                if previous.elapsed() < self.throttle {
                    debug!(
                        "🔄 Throttling game state for {} (last push {:?} ago)",
                        player,
                        previous.elapsed()
                    );
                    return false;
                }
            }
        }

        let payload = {
            let mut world = self.world.write().await;
            let Some(character) = world.players.get(player).cloned() else {
                debug!("No character for {}, skipping game state push", player);
                return false;
            };
            let planets = world.owned_planets(player);
            let missions = world.missions.get(player).cloned().unwrap_or_default();
            let leverage = scoring::compute_multiplier(&mut world, player, current_timestamp());

            json!({
                "character": character,
                "territories": planets,
                "missions": missions,
                "leverageMultiplier": leverage,
            })
        };

        let delivered = self
            .registry
            .send_event_to_player(player, "game_state_update", payload)
            .await;
        if delivered {
            let mut last_push = self.last_push.lock().await;
            last_push.insert(player.clone(), Instant::now());
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::Envelope;
    use crate::world::generator;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    async fn throttle_fixture(
        throttle: Duration,
    ) -> (Arc<StateBroadcaster>, Arc<SessionRegistry>, PlayerId) {
        let mut world = WorldState::default();
        let mut rng = StdRng::seed_from_u64(5);
        world.universe = generator::generate_universe(&mut rng);
        let player = PlayerId::from("alice");
        generator::provision_player(&mut world, &player, &mut rng);

        let registry = Arc::new(SessionRegistry::new(
            Duration::from_secs(45),
            Duration::from_secs(15),
            Duration::ZERO,
        ));
        let session = registry.add_session().await;
        registry.register(session, player.clone()).await;

        let broadcaster = Arc::new(StateBroadcaster::new(
            Arc::new(RwLock::new(world)),
            Arc::clone(&registry),
            throttle,
        ));
        (broadcaster, registry, player)
    }

    fn drain_updates(rx: &mut tokio::sync::broadcast::Receiver<(usize, Vec<u8>)>) -> usize {
        let mut count = 0;
        while let Ok((_, bytes)) = rx.try_recv() {
            let envelope: Envelope = serde_json::from_slice(&bytes).unwrap();
            if envelope.kind == "game_state_update" {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn test_second_push_inside_window_is_dropped() {
        let (broadcaster, registry, player) = throttle_fixture(Duration::from_secs(300)).await;
        let mut rx = registry.subscribe();

        assert!(broadcaster.push(&player).await);
        assert!(!broadcaster.push(&player).await);

        assert_eq!(drain_updates(&mut rx), 1);
    }

    #[tokio::test]
    async fn test_push_allowed_after_window() {
        let (broadcaster, registry, player) = throttle_fixture(Duration::from_millis(20)).await;
        let mut rx = registry.subscribe();

        assert!(broadcaster.push(&player).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(broadcaster.push(&player).await);

        assert_eq!(drain_updates(&mut rx), 2);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_arm_throttle() {
        let (broadcaster, registry, player) = throttle_fixture(Duration::from_secs(300)).await;
        // The player's session goes away: delivery fails softly.
        let session = registry.session_for_player(&player).await.unwrap();
        registry.disconnect(session).await;
        let _rx = registry.subscribe();

        assert!(!broadcaster.push(&player).await);

        // Reconnect: the failed attempt must not have started the window.
        let session = registry.add_session().await;
        registry.register(session, player.clone()).await;
        let mut rx = registry.subscribe();
        assert!(broadcaster.push(&player).await);
        assert_eq!(drain_updates(&mut rx), 1);
    }

    #[tokio::test]
    async fn test_snapshot_contains_owned_planets() {
        let (broadcaster, registry, player) = throttle_fixture(Duration::from_secs(300)).await;
        let mut rx = registry.subscribe();

        broadcaster.push(&player).await;
        let (_, bytes) = rx.recv().await.unwrap();
        let envelope: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope.kind, "game_state_update");

        let territories = envelope.payload["territories"].as_array().unwrap();
        assert_eq!(territories.len(), 1, "provisioned player owns a home planet");
        assert!(envelope.payload["leverageMultiplier"]["total"].as_f64().unwrap() >= 1.0);
    }
}
