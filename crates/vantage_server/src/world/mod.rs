//! World state: players, planets, and the universe they live in.
//!
//! All mutable game state is owned by a single [`WorldState`] behind an
//! `Arc<RwLock<_>>`. Handlers take the lock, complete their critical section
//! without suspending, and release it; only the battle tick loop spans
//! multiple lock acquisitions, which is an accepted design tradeoff (other
//! handlers may observe a player's resources mid-battle).

pub mod generator;
pub mod missions;

use crate::scoring::LeverageProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub use missions::{Mission, MissionKind, MissionReward};

/// Opaque, caller-supplied player identity.
///
/// The identity arrives in the first `connect` envelope of a session and is
/// never derived from transport details, so it stays stable across
/// reconnects from behind NAT or proxies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The four harvestable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Energy,
    Minerals,
    Crystals,
    Gas,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Energy,
        ResourceKind::Minerals,
        ResourceKind::Crystals,
        ResourceKind::Gas,
    ];
}

/// A resource deposit sitting on a planet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDeposit {
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub amount: i64,
}

/// 3D position in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0, z: 0.0 };
}

/// A player character. Created on first connection for a never-seen
/// identity, never deleted within the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub faction: String,
    pub level: u32,
    pub experience: i64,
    pub resources: HashMap<ResourceKind, i64>,
}

impl Player {
    /// Credits experience and levels the player up once the `1000 * level`
    /// threshold is crossed. Experience resets on level-up.
    pub fn gain_experience(&mut self, amount: i64) -> bool {
        self.experience += amount;
        if self.experience >= 1000 * i64::from(self.level) {
            self.level += 1;
            self.experience = 0;
            return true;
        }
        false
    }

    /// Current balance for a resource kind; missing entries count as zero.
    pub fn balance(&self, kind: ResourceKind) -> i64 {
        self.resources.get(&kind).copied().unwrap_or(0)
    }

    /// Adds (or subtracts, with a negative delta) from a resource balance.
    pub fn credit(&mut self, kind: ResourceKind, delta: i64) {
        *self.resources.entry(kind).or_insert(0) += delta;
    }
}

/// An ownable world location with a defense rating and resource yield.
///
/// Ownership changes only through a successful battle resolution or an
/// explicit claim of an unowned planet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Planet {
    pub id: String,
    pub name: String,
    #[serde(rename = "controlledBy")]
    pub owner: Option<PlayerId>,
    pub defense: u32,
    pub population: u32,
    pub resources: Vec<ResourceDeposit>,
    #[serde(rename = "systemId")]
    pub system_id: String,
    pub position: Position,
}

/// A star system: a sun plus the planets orbiting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarSystem {
    pub id: String,
    pub position: Position,
    pub sun_color: String,
    pub planets: Vec<Planet>,
}

/// The full universe snapshot sent to clients on `get_world`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Universe {
    pub systems: Vec<StarSystem>,
}

impl Universe {
    pub fn planets(&self) -> impl Iterator<Item = &Planet> {
        self.systems.iter().flat_map(|s| s.planets.iter())
    }

    pub fn planets_mut(&mut self) -> impl Iterator<Item = &mut Planet> {
        self.systems.iter_mut().flat_map(|s| s.planets.iter_mut())
    }
}

/// The authoritative, single-process world store.
///
/// Everything a command handler or battle task mutates lives here. The
/// structure is fully serializable so the persistence layer can dump and
/// reload it as one flat JSON blob.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WorldState {
    pub players: HashMap<PlayerId, Player>,
    pub universe: Universe,
    pub missions: HashMap<PlayerId, Vec<Mission>>,
    pub profiles: HashMap<PlayerId, LeverageProfile>,
    pub achievements: HashMap<PlayerId, Vec<String>>,
}

impl WorldState {
    /// Looks up a planet by id anywhere in the universe.
    pub fn find_planet(&self, planet_id: &str) -> Option<&Planet> {
        self.universe.planets().find(|p| p.id == planet_id)
    }

    /// Mutable variant of [`WorldState::find_planet`].
    pub fn find_planet_mut(&mut self, planet_id: &str) -> Option<&mut Planet> {
        self.universe.planets_mut().find(|p| p.id == planet_id)
    }

    /// Number of planets controlled by the given player.
    pub fn owned_planet_count(&self, player: &PlayerId) -> usize {
        self.universe
            .planets()
            .filter(|p| p.owner.as_ref() == Some(player))
            .count()
    }

    /// All planets controlled by the given player, cloned for snapshots.
    pub fn owned_planets(&self, player: &PlayerId) -> Vec<Planet> {
        self.universe
            .planets()
            .filter(|p| p.owner.as_ref() == Some(player))
            .cloned()
            .collect()
    }

    /// Number of distinct resource kinds the player holds a positive
    /// balance of. Feeds the resource-diversity leverage factor.
    pub fn distinct_resources_held(&self, player: &PlayerId) -> usize {
        self.players
            .get(player)
            .map(|p| p.resources.values().filter(|amount| **amount > 0).count())
            .unwrap_or(0)
    }

    /// Number of achievements unlocked by the player.
    pub fn achievement_count(&self, player: &PlayerId) -> usize {
        self.achievements.get(player).map(Vec::len).unwrap_or(0)
    }

    /// Records an achievement if the player does not already hold it.
    pub fn unlock_achievement(&mut self, player: &PlayerId, name: &str) -> bool {
        let unlocked = self.achievements.entry(player.clone()).or_default();
        if unlocked.iter().any(|a| a == name) {
            return false;
        }
        unlocked.push(name.to_string());
        true
    }

    /// Unlocks every `territory_expander` tier the player's current planet
    /// count qualifies for. Returns the newly unlocked names.
    pub fn award_territory_achievements(&mut self, player: &PlayerId) -> Vec<String> {
        const TIERS: [usize; 5] = [1, 3, 5, 10, 15];
        let owned = self.owned_planet_count(player);
        let mut unlocked = Vec::new();
        for tier in TIERS {
            if owned >= tier {
                let name = format!("territory_expander_{tier}");
                if self.unlock_achievement(player, &name) {
                    unlocked.push(name);
                }
            }
        }
        unlocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_planet(id: &str, owner: Option<&str>) -> Planet {
        Planet {
            id: id.to_string(),
            name: id.to_uppercase(),
            owner: owner.map(PlayerId::from),
            defense: 2,
            population: 50,
            resources: vec![ResourceDeposit { kind: ResourceKind::Energy, amount: 100 }],
            system_id: "system-0".to_string(),
            position: Position::ORIGIN,
        }
    }

    fn test_world() -> WorldState {
        let mut world = WorldState::default();
        world.universe.systems.push(StarSystem {
            id: "system-0".to_string(),
            position: Position::ORIGIN,
            sun_color: "#ffff66".to_string(),
            planets: vec![
                test_planet("planet-a", Some("alice")),
                test_planet("planet-b", Some("alice")),
                test_planet("planet-c", None),
            ],
        });
        world
    }

    #[test]
    fn test_find_planet() {
        let world = test_world();
        assert!(world.find_planet("planet-b").is_some());
        assert!(world.find_planet("planet-z").is_none());
    }

    #[test]
    fn test_owned_planet_count() {
        let world = test_world();
        assert_eq!(world.owned_planet_count(&PlayerId::from("alice")), 2);
        assert_eq!(world.owned_planet_count(&PlayerId::from("bob")), 0);
    }

    #[test]
    fn test_level_up_threshold() {
        let mut player = Player {
            name: "Commander 1".to_string(),
            faction: "United Earth Forces".to_string(),
            level: 1,
            experience: 0,
            resources: HashMap::new(),
        };

        assert!(!player.gain_experience(999));
        assert_eq!(player.level, 1);
        assert!(player.gain_experience(1));
        assert_eq!(player.level, 2);
        assert_eq!(player.experience, 0);
    }

    #[test]
    fn test_distinct_resources_ignores_empty_balances() {
        let mut world = test_world();
        let id = PlayerId::from("alice");
        let mut resources = HashMap::new();
        resources.insert(ResourceKind::Energy, 10);
        resources.insert(ResourceKind::Minerals, 0);
        resources.insert(ResourceKind::Gas, 3);
        world.players.insert(
            id.clone(),
            Player {
                name: "Commander 1".to_string(),
                faction: "United Earth Forces".to_string(),
                level: 1,
                experience: 0,
                resources,
            },
        );

        assert_eq!(world.distinct_resources_held(&id), 2);
    }

    #[test]
    fn test_unlock_achievement_is_idempotent() {
        let mut world = test_world();
        let id = PlayerId::from("alice");
        assert!(world.unlock_achievement(&id, "territory_expander_1"));
        assert!(!world.unlock_achievement(&id, "territory_expander_1"));
        assert_eq!(world.achievement_count(&id), 1);
    }
}
