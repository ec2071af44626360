//! Battle orchestration against shared world state.
//!
//! The coordinator enforces the one mandatory mutual-exclusion invariant of
//! the core: at most one unresolved battle per target planet. The
//! check-and-insert on the active-battle map happens inside a single lock
//! acquisition with no suspension point between the check and the insert.
//!
//! Each accepted attack spawns a registered, awaitable task that drives the
//! tick schedule to completion and applies the world mutation. Attacker
//! disconnects do not cancel a battle; its event sends simply fail
//! silently. [`BattleCoordinator::join_active`] lets orderly shutdown wait
//! for every in-flight battle.

use super::resolver::{self, BattleOutcome};
use crate::broadcast::StateBroadcaster;
use crate::error::GameError;
use crate::persistence::StateStore;
use crate::scoring;
use crate::session::SessionRegistry;
use crate::utils::current_timestamp;
use crate::world::{PlayerId, Position, WorldState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Snapshot of the battlefield taken when an attack is accepted.
struct BattlePlan {
    attacker: PlayerId,
    defender: Option<PlayerId>,
    source_id: String,
    target_id: String,
    source_position: Position,
    target_position: Position,
    target_name: String,
    attacker_count: u32,
    defender_count: u32,
    initial_defense: u32,
    multiplier: f64,
}

/// What a finished battle did to the world, echoed in `attack_result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedResult {
    pub new_owner: Option<PlayerId>,
    pub current_owner: Option<PlayerId>,
    pub defense: u32,
}

/// Orchestrates concurrent battle simulations.
pub struct BattleCoordinator {
    world: Arc<RwLock<WorldState>>,
    registry: Arc<SessionRegistry>,
    active: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    tick_interval: Duration,
    /// Pushes the post-battle game state to the attacker when attached
    broadcaster: Option<Arc<StateBroadcaster>>,
    /// Persists world mutations after resolution when attached
    store: Option<Arc<StateStore>>,
    /// Fixed seed for the combat roll, used by tests; live servers roll
    /// from entropy.
    rng_seed: Option<u64>,
}

impl BattleCoordinator {
    pub fn new(
        world: Arc<RwLock<WorldState>>,
        registry: Arc<SessionRegistry>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            world,
            registry,
            active: Arc::new(Mutex::new(HashMap::new())),
            tick_interval,
            broadcaster: None,
            store: None,
            rng_seed: None,
        }
    }

    /// Attaches the post-battle collaborators: a broadcaster for the final
    /// state push and an optional persistence store.
    pub fn with_services(
        mut self,
        broadcaster: Arc<StateBroadcaster>,
        store: Option<Arc<StateStore>>,
    ) -> Self {
        self.broadcaster = Some(broadcaster);
        self.store = store;
        self
    }

    /// Test constructor with a pinned combat roll.
    pub fn with_rng_seed(
        world: Arc<RwLock<WorldState>>,
        registry: Arc<SessionRegistry>,
        tick_interval: Duration,
        seed: u64,
    ) -> Self {
        let mut coordinator = Self::new(world, registry, tick_interval);
        coordinator.rng_seed = Some(seed);
        coordinator
    }

    /// Accepts or rejects an attack on a target planet.
    ///
    /// Rejected with `InvalidState` when an unresolved battle already holds
    /// the target, `NotFound` when either planet is unknown. On acceptance
    /// the battlefield is snapshotted, the attacker's multiplier fetched
    /// (which also prunes expired buffs), and an independent battle task
    /// spawned and registered under the target id.
    pub async fn begin_attack(
        self: &Arc<Self>,
        attacker: PlayerId,
        source_id: &str,
        target_id: &str,
        amount: u32,
    ) -> Result<(), GameError> {
        let plan = {
            let mut world = self.world.write().await;
            world
                .find_planet(source_id)
                .ok_or_else(|| GameError::NotFound(format!("source planet {source_id}")))?;
            let target = world
                .find_planet(target_id)
                .ok_or_else(|| GameError::NotFound(format!("target planet {target_id}")))?;

            let defender = target.owner.clone();
            let defender_count = target.defense * 40;
            let initial_defense = target.defense;
            let target_name = target.name.clone();
            let target_position = target.position;
            let source_position = world
                .find_planet(source_id)
                .map(|p| p.position)
                .unwrap_or(Position::ORIGIN);

            let multiplier =
                scoring::compute_multiplier(&mut world, &attacker, current_timestamp()).total;

            BattlePlan {
                attacker,
                defender,
                source_id: source_id.to_string(),
                target_id: target_id.to_string(),
                source_position,
                target_position,
                target_name,
                attacker_count: amount,
                defender_count,
                initial_defense,
                multiplier,
            }
        };

        // Check-and-insert must be atomic with respect to other attacks:
        // nothing awaits between the exclusivity check and the insert.
        let mut active = self.active.lock().await;
        if active.contains_key(target_id) {
            return Err(GameError::InvalidState(format!(
                "battle already in progress at {target_id}"
            )));
        }
        let coordinator = Arc::clone(self);
        let key = plan.target_id.clone();
        let handle = tokio::spawn(async move {
            coordinator.run_battle(plan).await;
        });
        active.insert(key, handle);
        Ok(())
    }

    /// Drives one battle from start event to world mutation.
    ///
    /// Every exit path removes the target from the active set - even a
    /// panicking simulation - so exclusivity can never deadlock a planet.
    async fn run_battle(self: Arc<Self>, plan: BattlePlan) {
        use futures::FutureExt;
        let target_id = plan.target_id.clone();
        if std::panic::AssertUnwindSafe(self.simulate(plan))
            .catch_unwind()
            .await
            .is_err()
        {
            error!("Battle simulation for {} failed internally", target_id);
        }
        self.active.lock().await.remove(&target_id);
    }

    async fn simulate(&self, plan: BattlePlan) {
        let registry = &self.registry;

        registry
            .send_event_to_player(
                &plan.attacker,
                "battle_started",
                json!({
                    "from_id": plan.source_id,
                    "to_id": plan.target_id,
                    "from_position": plan.source_position,
                    "to_position": plan.target_position,
                    "attackers": {"owner": plan.attacker, "count": plan.attacker_count},
                    "defenders": {"owner": plan.defender, "count": plan.defender_count},
                    "message": format!("Attack on {} has begun!", plan.target_name),
                }),
            )
            .await;

        let outcome = {
            let mut rng = match self.rng_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            resolver::resolve(plan.attacker_count, plan.defender_count, plan.multiplier, &mut rng)
        };

        // Intermediate ticks interpolate between the starting counts and
        // the survivors; each tick is a cooperative suspension point.
        for step in 1..=outcome.ticks {
            tokio::time::sleep(self.tick_interval).await;
            let attackers = resolver::interpolate(
                plan.attacker_count,
                outcome.attacker_survivors,
                step,
                outcome.ticks,
            );
            let defenders = resolver::interpolate(
                plan.defender_count,
                outcome.defender_survivors,
                step,
                outcome.ticks,
            );
            registry
                .send_event_to_player(
                    &plan.attacker,
                    "battle_update",
                    json!({
                        "planet_id": plan.target_id,
                        "attackers": {"owner": plan.attacker, "count": attackers},
                        "defenders": {"owner": plan.defender, "count": defenders},
                    }),
                )
                .await;
        }

        let applied = {
            let mut world = self.world.write().await;
            let applied = apply_outcome(&mut world, &plan.target_id, &plan.attacker, &outcome);
            if applied.as_ref().is_some_and(|a| a.new_owner.is_some()) {
                world.award_territory_achievements(&plan.attacker);
            }
            applied
        };
        let Some(applied) = applied else {
            // The target vanished mid-battle; nothing to mutate or report.
            error!("Target {} disappeared during battle", plan.target_id);
            return;
        };

        info!(
            "🎯 Battle at {} complete - success: {}, survivors: {}/{}",
            plan.target_id, outcome.success, outcome.attacker_survivors, outcome.defender_survivors
        );

        registry
            .send_event_to_player(
                &plan.attacker,
                "attack_result",
                json!({
                    "planet_id": plan.target_id,
                    "success": outcome.success,
                    "new_owner": applied.new_owner,
                    "current_owner": applied.current_owner,
                    "defense": applied.defense,
                    "position": plan.target_position,
                    "leverage_used": plan.multiplier,
                    "attack_power": (plan.multiplier * 100.0) as u32,
                    "defense_power": plan.initial_defense,
                    "attacking_units": plan.attacker_count,
                    "defending_units": plan.defender_count,
                    "source_planets": [plan.source_id],
                    "attacker_id": plan.attacker,
                    "defender_id": plan.defender,
                    "battle_duration": outcome.ticks,
                    "final_attacker_count": outcome.attacker_survivors,
                    "final_defender_count": outcome.defender_survivors,
                    "message": format!(
                        "{} {} battle completed",
                        if outcome.success { "🏆 Victory!" } else { "🛡️ Defense Held" },
                        plan.target_name
                    ),
                }),
            )
            .await;

        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.push(&plan.attacker).await;
        }
        if let Some(store) = &self.store {
            store.save(&self.world).await;
        }
    }

    /// Waits for every in-flight battle to finish. Used by orderly
    /// shutdown; there is no cancellation API for a running battle.
    pub async fn join_active(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut active = self.active.lock().await;
            active.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Number of unresolved battles.
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }
}

/// Applies a terminal battle outcome to the world.
///
/// On success the target changes hands and its defense is rebuilt from the
/// surviving attackers; on failure ownership is untouched and defense drops
/// by one, floored at 1. Defense is never negative. Returns `None` when the
/// target no longer exists.
pub fn apply_outcome(
    world: &mut WorldState,
    target_id: &str,
    attacker: &PlayerId,
    outcome: &BattleOutcome,
) -> Option<AppliedResult> {
    let planet = world.find_planet_mut(target_id)?;

    if outcome.success {
        planet.owner = Some(attacker.clone());
        planet.defense = (outcome.attacker_survivors / 20).max(1);
        Some(AppliedResult {
            new_owner: Some(attacker.clone()),
            current_owner: Some(attacker.clone()),
            defense: planet.defense,
        })
    } else {
        planet.defense = planet.defense.saturating_sub(1).max(1);
        Some(AppliedResult {
            new_owner: None,
            current_owner: planet.owner.clone(),
            defense: planet.defense,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Planet, ResourceDeposit, ResourceKind, StarSystem};
    use std::time::Duration;

    fn planet(id: &str, owner: Option<&str>, defense: u32) -> Planet {
        Planet {
            id: id.to_string(),
            name: id.to_uppercase(),
            owner: owner.map(PlayerId::from),
            defense,
            population: 40,
            resources: vec![ResourceDeposit { kind: ResourceKind::Energy, amount: 100 }],
            system_id: "system-0".to_string(),
            position: Position::ORIGIN,
        }
    }

    fn battle_world() -> Arc<RwLock<WorldState>> {
        let mut world = WorldState::default();
        world.universe.systems.push(StarSystem {
            id: "system-0".to_string(),
            position: Position::ORIGIN,
            sun_color: "#ffff66".to_string(),
            planets: vec![
                planet("planet-home", Some("alice"), 3),
                planet("planet-target", Some("bob"), 1),
            ],
        });
        Arc::new(RwLock::new(world))
    }

    fn test_registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Duration::from_secs(45),
            Duration::from_secs(15),
            Duration::ZERO,
        ))
    }

    #[tokio::test]
    async fn test_second_attack_on_same_target_rejected() {
        let world = battle_world();
        let registry = test_registry();
        // A long tick keeps the first battle unresolved while we probe.
        let coordinator = Arc::new(BattleCoordinator::new(
            world,
            registry,
            Duration::from_secs(30),
        ));

        coordinator
            .begin_attack(PlayerId::from("alice"), "planet-home", "planet-target", 100)
            .await
            .expect("first attack accepted");
        assert_eq!(coordinator.active_count().await, 1);

        let second = coordinator
            .begin_attack(PlayerId::from("alice"), "planet-home", "planet-target", 100)
            .await;
        assert!(matches!(second, Err(GameError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_unknown_target_rejected() {
        let world = battle_world();
        let registry = test_registry();
        let coordinator =
            Arc::new(BattleCoordinator::new(world, registry, Duration::from_millis(1)));

        let result = coordinator
            .begin_attack(PlayerId::from("alice"), "planet-home", "planet-nowhere", 10)
            .await;
        assert!(matches!(result, Err(GameError::NotFound(_))));
        assert_eq!(coordinator.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_overwhelming_attack_captures_target() {
        let world = battle_world();
        let registry = test_registry();
        let _rx = registry.subscribe();
        let coordinator = Arc::new(BattleCoordinator::new(
            Arc::clone(&world),
            registry,
            Duration::from_millis(1),
        ));

        // 100 unleveraged attackers against 40 defenders: ratio 2.5, the
        // deterministic tier.
        coordinator
            .begin_attack(PlayerId::from("alice"), "planet-home", "planet-target", 100)
            .await
            .unwrap();
        coordinator.join_active().await;

        let world = world.read().await;
        let target = world.find_planet("planet-target").unwrap();
        assert_eq!(target.owner, Some(PlayerId::from("alice")));
        // 70 survivors / 20 = 3
        assert_eq!(target.defense, 3);
        assert_eq!(coordinator.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_target_released_after_resolution() {
        let world = battle_world();
        let registry = test_registry();
        let _rx = registry.subscribe();
        let coordinator = Arc::new(BattleCoordinator::new(
            Arc::clone(&world),
            registry,
            Duration::from_millis(1),
        ));

        coordinator
            .begin_attack(PlayerId::from("alice"), "planet-home", "planet-target", 100)
            .await
            .unwrap();
        coordinator.join_active().await;

        // The same target is attackable again once resolved.
        let again = coordinator
            .begin_attack(PlayerId::from("alice"), "planet-home", "planet-target", 100)
            .await;
        assert!(again.is_ok());
        coordinator.join_active().await;
    }

    #[test]
    fn test_apply_outcome_failure_decrements_defense_with_floor() {
        let mut world = WorldState::default();
        world.universe.systems.push(StarSystem {
            id: "system-0".to_string(),
            position: Position::ORIGIN,
            sun_color: "#ffff66".to_string(),
            planets: vec![planet("planet-target", Some("bob"), 2)],
        });
        let attacker = PlayerId::from("alice");
        let loss = BattleOutcome {
            success: false,
            attacker_survivors: 0,
            defender_survivors: 64,
            ticks: 5,
        };

        let applied = apply_outcome(&mut world, "planet-target", &attacker, &loss).unwrap();
        assert_eq!(applied.new_owner, None);
        assert_eq!(applied.current_owner, Some(PlayerId::from("bob")));
        assert_eq!(applied.defense, 1);
        assert_eq!(world.find_planet("planet-target").unwrap().owner, Some(PlayerId::from("bob")));

        // Already at the floor: defense stays 1, never goes below.
        let applied = apply_outcome(&mut world, "planet-target", &attacker, &loss).unwrap();
        assert_eq!(applied.defense, 1);
    }

    #[test]
    fn test_apply_outcome_success_transfers_ownership() {
        let mut world = WorldState::default();
        world.universe.systems.push(StarSystem {
            id: "system-0".to_string(),
            position: Position::ORIGIN,
            sun_color: "#ffff66".to_string(),
            planets: vec![planet("planet-target", Some("bob"), 5)],
        });
        let attacker = PlayerId::from("alice");
        let win = BattleOutcome {
            success: true,
            attacker_survivors: 70,
            defender_survivors: 0,
            ticks: 3,
        };

        let applied = apply_outcome(&mut world, "planet-target", &attacker, &win).unwrap();
        assert_eq!(applied.new_owner, Some(attacker.clone()));
        assert_eq!(applied.defense, 3);
        assert_eq!(world.find_planet("planet-target").unwrap().owner, Some(attacker));
    }

    #[test]
    fn test_apply_outcome_small_win_keeps_minimum_garrison() {
        let mut world = WorldState::default();
        world.universe.systems.push(StarSystem {
            id: "system-0".to_string(),
            position: Position::ORIGIN,
            sun_color: "#ffff66".to_string(),
            planets: vec![planet("planet-target", None, 1)],
        });
        let win = BattleOutcome {
            success: true,
            attacker_survivors: 5,
            defender_survivors: 0,
            ticks: 2,
        };

        let applied =
            apply_outcome(&mut world, "planet-target", &PlayerId::from("alice"), &win).unwrap();
        // 5 / 20 truncates to zero; the floor keeps the garrison at 1.
        assert_eq!(applied.defense, 1);
    }
}
