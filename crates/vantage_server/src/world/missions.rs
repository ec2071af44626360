//! Mission templates, generation, and progress tracking.
//!
//! Missions are flavor-generated from a small template table and advance as
//! the player harvests. Completed and active mission counts feed the mission
//! leverage factor.

use super::{PlayerId, ResourceKind, WorldState};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How many missions a generation pass produces.
const MISSIONS_PER_BATCH: usize = 3;

/// Maximum missions a player can hold at once.
pub const MAX_MISSIONS: usize = 5;

/// The mission archetypes. Each kind carries its reward pool, base reward,
/// and progress rate as plain associated data rather than stored closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissionKind {
    Explore,
    Gather,
    Defend,
    Research,
}

impl MissionKind {
    pub const ALL: [MissionKind; 4] = [
        MissionKind::Explore,
        MissionKind::Gather,
        MissionKind::Defend,
        MissionKind::Research,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            MissionKind::Explore => "Explore territory",
            MissionKind::Gather => "Gather resources",
            MissionKind::Defend => "Defend position",
            MissionKind::Research => "Research technology",
        }
    }

    pub fn reward_pool(&self) -> [ResourceKind; 2] {
        match self {
            MissionKind::Explore | MissionKind::Defend => {
                [ResourceKind::Energy, ResourceKind::Minerals]
            }
            MissionKind::Gather | MissionKind::Research => {
                [ResourceKind::Crystals, ResourceKind::Gas]
            }
        }
    }

    pub fn base_reward(&self) -> i64 {
        match self {
            MissionKind::Explore => 150,
            MissionKind::Gather => 100,
            MissionKind::Defend => 200,
            MissionKind::Research => 250,
        }
    }

    /// Multiplier applied to progress gained per harvest.
    pub fn progress_rate(&self) -> f64 {
        match self {
            MissionKind::Explore => 1.2,
            MissionKind::Gather => 1.0,
            MissionKind::Defend => 0.8,
            MissionKind::Research => 0.6,
        }
    }
}

/// The reward granted when a mission completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionReward {
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub amount: i64,
}

/// A single mission offered to a player.
///
/// Progress runs 0..=100; a mission is active once accepted (progress > 0)
/// and completable at exactly 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: MissionKind,
    pub target_planet: String,
    pub reward: MissionReward,
    pub progress: u8,
    pub started_at: Option<u64>,
}

impl Mission {
    pub fn is_active(&self) -> bool {
        self.progress > 0 && self.progress < 100
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= 100
    }
}

/// Generates a batch of missions scaled to the character level.
///
/// Rewards scale linearly with level plus a little random variation, the
/// way mission reward tables usually do.
pub fn generate_missions<R: Rng + ?Sized>(
    world: &WorldState,
    level: u32,
    rng: &mut R,
) -> Vec<Mission> {
    let planet_names: Vec<String> = world.universe.planets().map(|p| p.name.clone()).collect();

    (0..MISSIONS_PER_BATCH)
        .map(|_| {
            let kind = *MissionKind::ALL.choose(rng).expect("non-empty kind table");
            let reward_kind = *kind.reward_pool().choose(rng).expect("non-empty reward pool");
            let target = planet_names
                .choose(rng)
                .cloned()
                .unwrap_or_else(|| "Deep Space".to_string());

            let level_multiplier = 1.0 + f64::from(level.saturating_sub(1)) * 0.5;
            let variation = rng.gen_range(0.8..1.2);
            let amount = (kind.base_reward() as f64 * level_multiplier * variation) as i64;

            Mission {
                id: format!("mission-{}", Uuid::new_v4()),
                title: format!("Level {} {}", level, kind.title()),
                description: format!("{} around {}", kind.title(), target),
                kind,
                target_planet: target,
                reward: MissionReward { kind: reward_kind, amount },
                progress: 0,
                started_at: None,
            }
        })
        .collect()
}

/// Advances every active mission for the player after a harvest.
///
/// Returns the ids of missions whose progress changed. Gains are scaled by
/// each mission kind's progress rate and capped at 100.
pub fn advance_missions<R: Rng + ?Sized>(
    world: &mut WorldState,
    player: &PlayerId,
    rng: &mut R,
) -> Vec<String> {
    let Some(missions) = world.missions.get_mut(player) else {
        return Vec::new();
    };

    let mut updated = Vec::new();
    for mission in missions.iter_mut().filter(|m| m.is_active()) {
        let base: u8 = rng.gen_range(10..=25);
        let gain = (f64::from(base) * mission.kind.progress_rate()) as u8;
        let next = mission.progress.saturating_add(gain).min(100);
        if next != mission.progress {
            mission.progress = next;
            updated.push(mission.id.clone());
        }
    }
    updated
}
