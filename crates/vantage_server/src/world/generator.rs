//! Procedural generation of the starting universe and new-player content.
//!
//! These are simple collaborators of the core: plain functions that fill the
//! world store with randomized content. They carry no concurrency concerns
//! and run either at process start or inside a handler's critical section.

use super::missions::generate_missions;
use super::{
    Planet, Player, PlayerId, Position, ResourceDeposit, ResourceKind, StarSystem, WorldState,
};
use crate::scoring::LeverageProfile;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::f64::consts::TAU;
use tracing::info;

const SUN_COLORS: [&str; 3] = ["#ffff66", "#66aaff", "#ff8866"];
const STARTER_RESOURCES: [(ResourceKind, i64); 4] = [
    (ResourceKind::Energy, 1000),
    (ResourceKind::Minerals, 500),
    (ResourceKind::Crystals, 250),
    (ResourceKind::Gas, 100),
];

/// Generates the starting universe: a handful of systems, each with a sun
/// and a few planets on randomized orbits.
pub fn generate_universe<R: Rng + ?Sized>(rng: &mut R) -> super::Universe {
    let mut systems = Vec::new();
    for s in 0..3 {
        let system_id = format!("system-{s}");
        let system_pos = Position {
            x: rng.gen_range(-40.0..40.0),
            y: rng.gen_range(-10.0..10.0),
            z: rng.gen_range(-40.0..40.0),
        };

        let planet_count = rng.gen_range(4..=6);
        let mut planets = Vec::new();
        for p in 0..planet_count {
            let orbit_radius = 2.5 + p as f64 * 1.5 + rng.gen_range(-0.2..0.4);
            let angle = rng.gen_range(0.0..TAU);

            let deposit_count = rng.gen_range(1..=3);
            let resources = (0..deposit_count)
                .map(|_| ResourceDeposit {
                    kind: *ResourceKind::ALL.choose(rng).expect("non-empty kind table"),
                    amount: rng.gen_range(80..=600),
                })
                .collect();

            planets.push(Planet {
                id: format!("planet-{system_id}-{p}"),
                name: format!("P{} of {}", p + 1, system_id.to_uppercase()),
                owner: None,
                defense: rng.gen_range(0..=4),
                population: rng.gen_range(20..=100),
                resources,
                system_id: system_id.clone(),
                position: Position {
                    x: system_pos.x + angle.cos() * orbit_radius,
                    y: system_pos.y + rng.gen_range(-0.5..0.5),
                    z: system_pos.z + angle.sin() * orbit_radius,
                },
            });
        }

        systems.push(StarSystem {
            id: system_id,
            position: system_pos,
            sun_color: SUN_COLORS.choose(rng).expect("non-empty color table").to_string(),
            planets,
        });
    }

    super::Universe { systems }
}

/// Provisions a never-seen identity: default character, starter resources,
/// an initial mission batch, a fresh leverage profile, and a home planet.
///
/// Idempotent: a second call for a known player is a no-op.
pub fn provision_player<R: Rng + ?Sized>(
    world: &mut WorldState,
    player: &PlayerId,
    rng: &mut R,
) -> bool {
    if world.players.contains_key(player) {
        return false;
    }

    let character = Player {
        name: format!("Commander {}", world.players.len() + 1),
        faction: "United Earth Forces".to_string(),
        level: 1,
        experience: 0,
        resources: HashMap::from(STARTER_RESOURCES),
    };
    world.players.insert(player.clone(), character);
    world.profiles.insert(player.clone(), LeverageProfile::default());

    let missions = generate_missions(world, 1, rng);
    world.missions.insert(player.clone(), missions);

    ensure_home_planet(world, player);
    info!("🎮 Provisioned new commander for {player}");
    true
}

/// Guarantees the player controls at least one planet, assigning the first
/// unclaimed one as a home world with a minimum defense rating.
pub fn ensure_home_planet(world: &mut WorldState, player: &PlayerId) {
    let already_owned = world
        .universe
        .planets()
        .any(|p| p.owner.as_ref() == Some(player));
    if already_owned {
        return;
    }

    if let Some(planet) = world.universe.planets_mut().find(|p| p.owner.is_none()) {
        planet.owner = Some(player.clone());
        planet.defense = planet.defense.max(3);
        info!("🏠 Assigned home planet {} to {player}", planet.id);
    }
}
