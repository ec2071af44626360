//! Leverage scoring: turning a player's progress into a bounded multiplier.
//!
//! The engine aggregates seven independently-capped progress signals into a
//! single multiplier clamped to `[1.0, 2.0]`. Six factors are derived from
//! live world state (planets held, resource diversity, missions, level,
//! achievements); two come from the player's stored [`LeverageProfile`]
//! (persistent research and expiring temporary buffs). Computing the
//! multiplier is also the garbage-collection pass for expired buffs: any
//! buff with `expires_at <= now` is dropped from the stored profile during
//! the call.

use crate::world::{PlayerId, WorldState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Floor and ceiling of the realized multiplier.
pub const MIN_MULTIPLIER: f64 = 1.0;
pub const MAX_MULTIPLIER: f64 = 2.0;

const TERRITORY_CAP: f64 = 0.30;
const DIVERSITY_CAP: f64 = 0.20;
const MISSION_CAP: f64 = 0.25;
const LEVEL_CAP: f64 = 0.25;
const ACHIEVEMENT_CAP: f64 = 0.20;
const RESEARCH_CAP: f64 = 0.30;
const TEMP_BUFF_CAP: f64 = 0.20;

/// Research step granted per deployment.
pub const RESEARCH_STEP: f64 = 0.05;

/// Lifetime of a temporary buff in seconds.
pub const TEMP_BUFF_SECS: u64 = 60;

/// The research branches a player can deploy into.
///
/// Costs are closed-form per branch, expressed as plain functions over this
/// enumeration rather than callables stored in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchTech {
    ResourceEfficiency,
    DefenseSystems,
    EnergyManipulation,
    TerritoryControl,
}

impl ResearchTech {
    /// Minimum energy cost to deploy one step of this branch.
    pub fn base_cost(&self) -> i64 {
        match self {
            ResearchTech::ResourceEfficiency => 100,
            ResearchTech::DefenseSystems => 150,
            ResearchTech::EnergyManipulation => 200,
            ResearchTech::TerritoryControl => 250,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "resource_efficiency" => Some(ResearchTech::ResourceEfficiency),
            "defense_systems" => Some(ResearchTech::DefenseSystems),
            "energy_manipulation" => Some(ResearchTech::EnergyManipulation),
            "territory_control" => Some(ResearchTech::TerritoryControl),
            _ => None,
        }
    }
}

impl fmt::Display for ResearchTech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResearchTech::ResourceEfficiency => "resource_efficiency",
            ResearchTech::DefenseSystems => "defense_systems",
            ResearchTech::EnergyManipulation => "energy_manipulation",
            ResearchTech::TerritoryControl => "territory_control",
        };
        f.write_str(name)
    }
}

/// A leverage contribution with an expiry timestamp, pruned lazily on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempBuff {
    pub level: f64,
    pub expires_at: u64,
}

/// Per-player stored leverage inputs.
///
/// Research levels are persistent and monotonic non-decreasing; temporary
/// buffs expire and are removed the next time the multiplier is computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeverageProfile {
    pub research: HashMap<ResearchTech, f64>,
    pub temp_buffs: HashMap<ResearchTech, TempBuff>,
}

impl LeverageProfile {
    /// Raises the persistent research level for a branch and refreshes the
    /// matching temporary buff for [`TEMP_BUFF_SECS`].
    pub fn deploy(&mut self, tech: ResearchTech, now: u64) -> (f64, f64) {
        let level = self.research.entry(tech).or_insert(0.0);
        *level += RESEARCH_STEP;
        let persistent = *level;

        let buff = self.temp_buffs.entry(tech).or_insert(TempBuff {
            level: 0.0,
            expires_at: 0,
        });
        buff.level += RESEARCH_STEP;
        buff.expires_at = now + TEMP_BUFF_SECS;
        (persistent, buff.level)
    }
}

/// One reported factor of the multiplier breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorBonus {
    pub value: f64,
    pub cap: f64,
    pub description: String,
    /// `value / cap`, for client progress bars.
    pub progress: f64,
}

impl FactorBonus {
    fn new(value: f64, cap: f64, description: String) -> Self {
        Self { value, cap, description, progress: value / cap }
    }
}

/// The full scoring result.
///
/// The not-found path returns [`LeverageBreakdown::neutral`] - the same
/// shape as the success path, never a bare number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageBreakdown {
    pub total: f64,
    pub base_rate: f64,
    pub bonuses: BTreeMap<String, FactorBonus>,
    pub efficiency: f64,
    pub potential_increase: f64,
}

impl LeverageBreakdown {
    /// The constant result for an unknown player: multiplier 1.0, no factors.
    pub fn neutral() -> Self {
        Self {
            total: MIN_MULTIPLIER,
            base_rate: MIN_MULTIPLIER,
            bonuses: BTreeMap::new(),
            efficiency: 0.0,
            potential_increase: MAX_MULTIPLIER - MIN_MULTIPLIER,
        }
    }
}

/// Computes the leverage multiplier for a player.
///
/// Side effect: expired temporary buffs are removed from the player's stored
/// profile, so the call is simultaneously a query and a GC pass. Unknown
/// players yield the neutral breakdown.
pub fn compute_multiplier(
    world: &mut WorldState,
    player: &PlayerId,
    now: u64,
) -> LeverageBreakdown {
    let Some(character) = world.players.get(player) else {
        return LeverageBreakdown::neutral();
    };
    let level = character.level;

    let mut bonuses = BTreeMap::new();

    // Territory control (max 30%)
    let owned = world.owned_planet_count(player);
    let territory = (owned as f64 * 0.05).min(TERRITORY_CAP);
    if territory > 0.0 {
        bonuses.insert(
            "territory".to_string(),
            FactorBonus::new(territory, TERRITORY_CAP, format!("Controlling {owned} planets")),
        );
    }

    // Resource diversity (max 20%)
    let distinct = world.distinct_resources_held(player);
    let diversity = (distinct as f64 * 0.05).min(DIVERSITY_CAP);
    if diversity > 0.0 {
        bonuses.insert(
            "resources".to_string(),
            FactorBonus::new(
                diversity,
                DIVERSITY_CAP,
                format!("Diversified {distinct} resource types"),
            ),
        );
    }

    // Missions (max 25%)
    let (completed, active) = world
        .missions
        .get(player)
        .map(|missions| {
            let completed = missions.iter().filter(|m| m.is_complete()).count();
            let active = missions.iter().filter(|m| m.is_active()).count();
            (completed, active)
        })
        .unwrap_or((0, 0));
    let mission = (completed as f64 * 0.025 + active as f64 * 0.01).min(MISSION_CAP);
    if mission > 0.0 {
        bonuses.insert(
            "missions".to_string(),
            FactorBonus::new(
                mission,
                MISSION_CAP,
                format!("{completed} completed, {active} active missions"),
            ),
        );
    }

    // Level progression (max 25%)
    let level_bonus = (f64::from(level.saturating_sub(1)) * 0.05).min(LEVEL_CAP);
    if level_bonus > 0.0 {
        bonuses.insert(
            "level".to_string(),
            FactorBonus::new(level_bonus, LEVEL_CAP, format!("Level {level} progression")),
        );
    }

    // Achievements (max 20%)
    let achievements = world.achievement_count(player);
    let achievement = (achievements as f64 * 0.02).min(ACHIEVEMENT_CAP);
    if achievement > 0.0 {
        bonuses.insert(
            "achievements".to_string(),
            FactorBonus::new(
                achievement,
                ACHIEVEMENT_CAP,
                format!("{achievements} achievements unlocked"),
            ),
        );
    }

    // Research and temp buffs read (and prune) the stored profile.
    if let Some(profile) = world.profiles.get_mut(player) {
        let research: f64 = profile.research.values().sum::<f64>().min(RESEARCH_CAP);
        if research > 0.0 {
            bonuses.insert(
                "research".to_string(),
                FactorBonus::new(research, RESEARCH_CAP, "Technology advancements".to_string()),
            );
        }

        // Expired buffs are dropped here; the read doubles as a GC pass.
        profile
            .temp_buffs
            .retain(|_, buff| buff.expires_at > now && buff.level > 0.0);
        let temp: f64 = profile
            .temp_buffs
            .values()
            .map(|b| b.level)
            .sum::<f64>()
            .min(TEMP_BUFF_CAP);
        if temp > 0.0 {
            bonuses.insert(
                "temp_buffs".to_string(),
                FactorBonus::new(temp, TEMP_BUFF_CAP, "Recent research deployments".to_string()),
            );
        }
    }

    let raw = MIN_MULTIPLIER + bonuses.values().map(|b| b.value).sum::<f64>();
    let total = raw.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);

    LeverageBreakdown {
        total,
        base_rate: MIN_MULTIPLIER,
        bonuses,
        efficiency: (total - MIN_MULTIPLIER) / (MAX_MULTIPLIER - MIN_MULTIPLIER),
        potential_increase: MAX_MULTIPLIER - total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{
        Planet, Player, Position, ResourceDeposit, ResourceKind, StarSystem, WorldState,
    };
    use std::collections::HashMap;

    fn planet(id: &str, owner: Option<&PlayerId>) -> Planet {
        Planet {
            id: id.to_string(),
            name: id.to_uppercase(),
            owner: owner.cloned(),
            defense: 1,
            population: 40,
            resources: vec![ResourceDeposit { kind: ResourceKind::Energy, amount: 100 }],
            system_id: "system-0".to_string(),
            position: Position::ORIGIN,
        }
    }

    fn world_with(player: &PlayerId, planets: usize, resources: usize, level: u32) -> WorldState {
        let mut world = WorldState::default();
        let owned: Vec<Planet> = (0..planets)
            .map(|i| planet(&format!("planet-{i}"), Some(player)))
            .collect();
        world.universe.systems.push(StarSystem {
            id: "system-0".to_string(),
            position: Position::ORIGIN,
            sun_color: "#ffff66".to_string(),
            planets: owned,
        });

        let mut held = HashMap::new();
        for kind in ResourceKind::ALL.into_iter().take(resources) {
            held.insert(kind, 100);
        }
        world.players.insert(
            player.clone(),
            Player {
                name: "Commander 1".to_string(),
                faction: "United Earth Forces".to_string(),
                level,
                experience: 0,
                resources: held,
            },
        );
        world.profiles.insert(player.clone(), LeverageProfile::default());
        world
    }

    #[test]
    fn test_documented_scenario() {
        // 3 planets, 3 distinct resources, level 4, nothing else:
        // 0.15 + 0.15 + 0.15 => total 1.45, efficiency 0.45.
        let player = PlayerId::from("alice");
        let mut world = world_with(&player, 3, 3, 4);

        let result = compute_multiplier(&mut world, &player, 0);
        assert!((result.total - 1.45).abs() < 1e-9);
        assert!((result.efficiency - 0.45).abs() < 1e-9);
        assert_eq!(result.bonuses.len(), 3);
        assert!((result.bonuses["territory"].value - 0.15).abs() < 1e-9);
        assert!((result.bonuses["resources"].value - 0.15).abs() < 1e-9);
        assert!((result.bonuses["level"].value - 0.15).abs() < 1e-9);
        assert!((result.bonuses["level"].progress - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_total_is_always_bounded() {
        let player = PlayerId::from("alice");
        // Everything maxed out well past each cap.
        let mut world = world_with(&player, 50, 4, 99);
        for _ in 0..40 {
            world.achievements.entry(player.clone()).or_default().push("a".into());
        }
        let profile = world.profiles.get_mut(&player).unwrap();
        profile.research.insert(ResearchTech::ResourceEfficiency, 5.0);
        profile.temp_buffs.insert(
            ResearchTech::DefenseSystems,
            TempBuff { level: 9.0, expires_at: u64::MAX },
        );

        let result = compute_multiplier(&mut world, &player, 0);
        assert!(result.total <= MAX_MULTIPLIER);
        assert!(result.total >= MIN_MULTIPLIER);
        assert_eq!(result.total, MAX_MULTIPLIER);
        assert!((result.potential_increase).abs() < 1e-9);

        // Every factor is individually capped.
        assert!((result.bonuses["territory"].value - 0.30).abs() < 1e-9);
        assert!((result.bonuses["resources"].value - 0.20).abs() < 1e-9);
        assert!((result.bonuses["research"].value - 0.30).abs() < 1e-9);
        assert!((result.bonuses["temp_buffs"].value - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_expired_buffs_pruned_on_read() {
        let player = PlayerId::from("alice");
        let mut world = world_with(&player, 0, 0, 1);
        let profile = world.profiles.get_mut(&player).unwrap();
        profile.temp_buffs.insert(
            ResearchTech::EnergyManipulation,
            TempBuff { level: 0.1, expires_at: 100 },
        );
        profile.temp_buffs.insert(
            ResearchTech::DefenseSystems,
            TempBuff { level: 0.05, expires_at: 1000 },
        );

        let result = compute_multiplier(&mut world, &player, 100);
        // The buff that expired at exactly `now` contributes nothing...
        assert!((result.bonuses["temp_buffs"].value - 0.05).abs() < 1e-9);
        // ...and is gone from the stored profile afterwards.
        let profile = &world.profiles[&player];
        assert_eq!(profile.temp_buffs.len(), 1);
        assert!(profile.temp_buffs.contains_key(&ResearchTech::DefenseSystems));
    }

    #[test]
    fn test_unknown_player_gets_neutral_shape() {
        let mut world = WorldState::default();
        let result = compute_multiplier(&mut world, &PlayerId::from("ghost"), 0);
        assert_eq!(result.total, MIN_MULTIPLIER);
        assert!(result.bonuses.is_empty());
        assert_eq!(result.efficiency, 0.0);
        assert!((result.potential_increase - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_deploy_refreshes_buff_and_raises_research() {
        let mut profile = LeverageProfile::default();
        let (persistent, temp) = profile.deploy(ResearchTech::TerritoryControl, 50);
        assert!((persistent - RESEARCH_STEP).abs() < 1e-9);
        assert!((temp - RESEARCH_STEP).abs() < 1e-9);

        let (persistent, temp) = profile.deploy(ResearchTech::TerritoryControl, 80);
        assert!((persistent - 2.0 * RESEARCH_STEP).abs() < 1e-9);
        assert!((temp - 2.0 * RESEARCH_STEP).abs() < 1e-9);
        assert_eq!(
            profile.temp_buffs[&ResearchTech::TerritoryControl].expires_at,
            80 + TEMP_BUFF_SECS
        );
    }

    #[test]
    fn test_research_parse_round_trip() {
        for tech in [
            ResearchTech::ResourceEfficiency,
            ResearchTech::DefenseSystems,
            ResearchTech::EnergyManipulation,
            ResearchTech::TerritoryControl,
        ] {
            assert_eq!(ResearchTech::parse(&tech.to_string()), Some(tech));
        }
        assert_eq!(ResearchTech::parse("warp_drive"), None);
    }
}
