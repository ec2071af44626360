//! Command handlers: the game semantics behind each inbound message type.
//!
//! Every handler takes the shared [`GameContext`], does its critical
//! section under the world lock without suspending, emits its result
//! events, and returns a [`GameError`] for the router to surface. State
//! pushes go through the throttled broadcaster; persistence saves are
//! best-effort.

use crate::error::GameError;
use crate::messaging::types::{
    AttackRequest, ClaimRequest, ConnectRequest, Envelope, HarvestRequest, MissionRequest,
    ResearchRequest, SatelliteRequest,
};
use crate::scoring::{self, ResearchTech};
use crate::server::GameContext;
use crate::session::{ConnectStatus, SessionId};
use crate::utils::current_timestamp;
use crate::world::missions::{self, MAX_MISSIONS};
use crate::world::{generator, PlayerId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, GameError> {
    serde_json::from_value(payload).map_err(|e| GameError::Protocol(format!("bad payload: {e}")))
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Recomputes the player's leverage and pushes a `leverage_changed` event.
async fn emit_leverage_changed(ctx: &GameContext, player: &PlayerId) {
    let breakdown = {
        let mut world = ctx.world.write().await;
        scoring::compute_multiplier(&mut world, player, current_timestamp())
    };
    ctx.registry
        .send_event_to_player(player, "leverage_changed", to_value(&breakdown))
        .await;
}

async fn save_world(ctx: &GameContext) {
    if let Some(store) = &ctx.store {
        store.save(&ctx.world).await;
    }
}

/// Binds the caller-supplied identity to the session, provisions a
/// never-seen player, and sends the initial state broadcast.
///
/// Provisioning always happens before the first `game_state_update` so a
/// new commander's first snapshot already shows the home planet.
pub async fn handle_connect(
    ctx: &Arc<GameContext>,
    session_id: SessionId,
    payload: Value,
) -> Result<(), GameError> {
    let request: ConnectRequest = parse(payload)?;
    if request.player_id.as_str().is_empty() {
        return Err(GameError::Protocol("player_id must not be empty".into()));
    }

    let status = ctx.registry.register(session_id, request.player_id.clone()).await;

    let provisioned = {
        let mut world = ctx.world.write().await;
        let mut rng = StdRng::from_entropy();
        generator::provision_player(&mut world, &request.player_id, &mut rng)
    };

    ctx.registry.send_to_session(
        session_id,
        &Envelope::event(
            "connection_status",
            json!({
                "status": match status {
                    ConnectStatus::Accepted => "connected",
                    ConnectStatus::AlreadyActive => "already_active",
                },
                "player_id": request.player_id,
            }),
        ),
    );

    ctx.broadcaster.push(&request.player_id).await;
    if provisioned {
        save_world(ctx).await;
    }
    Ok(())
}

/// Sends the full universe snapshot, guaranteeing a home planet first.
pub async fn handle_get_world(
    ctx: &Arc<GameContext>,
    session_id: SessionId,
    player: PlayerId,
) -> Result<(), GameError> {
    let universe = {
        let mut world = ctx.world.write().await;
        generator::ensure_home_planet(&mut world, &player);
        to_value(&world.universe)
    };
    ctx.registry
        .send_to_session(session_id, &Envelope::event("world_state", universe));
    ctx.broadcaster.push(&player).await;
    Ok(())
}

/// Computes and returns the leverage breakdown on demand.
///
/// An unknown player receives the neutral breakdown - the same shape as
/// every other response, never a failure.
pub async fn handle_calculate_leverage(
    ctx: &Arc<GameContext>,
    session_id: SessionId,
    player: PlayerId,
) -> Result<(), GameError> {
    let breakdown = {
        let mut world = ctx.world.write().await;
        scoring::compute_multiplier(&mut world, &player, current_timestamp())
    };
    ctx.registry
        .send_to_session(session_id, &Envelope::event("leverage_calculated", to_value(&breakdown)));
    Ok(())
}

/// Harvests an owned planet: leverage-scaled energy and mineral gains, plus
/// progress on whatever missions are active.
pub async fn handle_harvest_planet(
    ctx: &Arc<GameContext>,
    player: PlayerId,
    payload: Value,
) -> Result<(), GameError> {
    let request: HarvestRequest = parse(payload)?;

    let (gain_energy, gain_minerals, planet_name, mission_updates) = {
        let mut world = ctx.world.write().await;
        let planet = world
            .find_planet(&request.planet_id)
            .ok_or_else(|| GameError::NotFound(format!("planet {}", request.planet_id)))?;
        if planet.owner.as_ref() != Some(&player) {
            return Err(GameError::InvalidState("you do not control this planet".into()));
        }
        let planet_name = planet.name.clone();

        let multiplier = scoring::compute_multiplier(&mut world, &player, current_timestamp()).total;
        let mut rng = StdRng::from_entropy();
        let gain_energy = (f64::from(rng.gen_range(8..=18)) * multiplier) as i64;
        let gain_minerals = (f64::from(rng.gen_range(5..=12)) * multiplier) as i64;

        let character = world
            .players
            .get_mut(&player)
            .ok_or_else(|| GameError::NotFound(format!("player {player}")))?;
        character.credit(crate::world::ResourceKind::Energy, gain_energy);
        character.credit(crate::world::ResourceKind::Minerals, gain_minerals);

        let mission_updates = missions::advance_missions(&mut world, &player, &mut rng);
        (gain_energy, gain_minerals, planet_name, mission_updates)
    };

    ctx.registry
        .send_event_to_player(
            &player,
            "harvest_planet_result",
            json!({
                "planet_id": request.planet_id,
                "energy": gain_energy,
                "minerals": gain_minerals,
                "mission_updates": mission_updates,
                "message": format!(
                    "Harvested {gain_energy} energy and {gain_minerals} minerals from {planet_name}"
                ),
            }),
        )
        .await;

    ctx.broadcaster.push(&player).await;
    emit_leverage_changed(ctx, &player).await;
    save_world(ctx).await;
    Ok(())
}

/// Claims an unowned planet for the player.
pub async fn handle_claim_planet(
    ctx: &Arc<GameContext>,
    player: PlayerId,
    payload: Value,
) -> Result<(), GameError> {
    let request: ClaimRequest = parse(payload)?;

    let unlocked = {
        let mut world = ctx.world.write().await;
        let planet = world
            .find_planet_mut(&request.planet_id)
            .ok_or_else(|| GameError::NotFound(format!("planet {}", request.planet_id)))?;
        if planet.owner.is_some() {
            return Err(GameError::InvalidState("planet already controlled".into()));
        }
        planet.owner = Some(player.clone());
        world.award_territory_achievements(&player)
    };

    info!("🚩 Planet {} claimed by {}", request.planet_id, player);
    ctx.registry
        .send_event_to_player(
            &player,
            "planet_claimed",
            json!({
                "planet_id": request.planet_id,
                "owner": player,
                "achievements": unlocked,
            }),
        )
        .await;

    ctx.broadcaster.push(&player).await;
    emit_leverage_changed(ctx, &player).await;
    save_world(ctx).await;
    Ok(())
}

/// Spends minerals to raise an owned planet's defense by one.
pub async fn handle_build_satellite(
    ctx: &Arc<GameContext>,
    player: PlayerId,
    payload: Value,
) -> Result<(), GameError> {
    let request: SatelliteRequest = parse(payload)?;
    let cost = request.cost.max(1);

    let (defense, position) = {
        let mut world = ctx.world.write().await;
        let planet = world
            .find_planet(&request.planet_id)
            .ok_or_else(|| GameError::NotFound(format!("planet {}", request.planet_id)))?;
        if planet.owner.as_ref() != Some(&player) {
            return Err(GameError::InvalidState("you do not control this planet".into()));
        }

        let character = world
            .players
            .get_mut(&player)
            .ok_or_else(|| GameError::NotFound(format!("player {player}")))?;
        if character.balance(crate::world::ResourceKind::Minerals) < cost {
            return Err(GameError::InsufficientResources(format!("{cost} minerals needed")));
        }
        character.credit(crate::world::ResourceKind::Minerals, -cost);

        let planet = world
            .find_planet_mut(&request.planet_id)
            .ok_or_else(|| GameError::NotFound(format!("planet {}", request.planet_id)))?;
        planet.defense += 1;
        (planet.defense, planet.position)
    };

    ctx.registry
        .send_event_to_player(
            &player,
            "planet_updated",
            json!({
                "planet_id": request.planet_id,
                "defense": defense,
                "owner": player,
                "position": position,
                "message": "Defense increased via satellite deployment",
            }),
        )
        .await;

    // Satellites do not change leverage; no leverage_changed here.
    ctx.broadcaster.push(&player).await;
    save_world(ctx).await;
    Ok(())
}

/// Spends energy on a research branch: a persistent level plus a temporary
/// buff that expires a minute out.
pub async fn handle_deploy_research(
    ctx: &Arc<GameContext>,
    player: PlayerId,
    payload: Value,
) -> Result<(), GameError> {
    let request: ResearchRequest = parse(payload)?;
    let tech = ResearchTech::parse(&request.tech)
        .ok_or_else(|| GameError::Protocol(format!("unknown research tech: {}", request.tech)))?;
    if request.cost < tech.base_cost() {
        return Err(GameError::InsufficientResources(format!(
            "{tech} requires at least {} energy",
            tech.base_cost()
        )));
    }

    let (level, temp_level) = {
        let mut world = ctx.world.write().await;
        let character = world
            .players
            .get_mut(&player)
            .ok_or_else(|| GameError::NotFound(format!("player {player}")))?;
        if character.balance(crate::world::ResourceKind::Energy) < request.cost {
            return Err(GameError::InsufficientResources(format!(
                "{} energy needed",
                request.cost
            )));
        }
        character.credit(crate::world::ResourceKind::Energy, -request.cost);

        let profile = world.profiles.entry(player.clone()).or_default();
        profile.deploy(tech, current_timestamp())
    };

    ctx.registry
        .send_event_to_player(
            &player,
            "research_result",
            json!({
                "tech": tech,
                "level": level,
                "temp_level": temp_level,
                "cost": request.cost,
                "message": format!("Research deployed: {tech} now {level:.2}"),
            }),
        )
        .await;

    ctx.broadcaster.push(&player).await;
    emit_leverage_changed(ctx, &player).await;
    save_world(ctx).await;
    Ok(())
}

/// Starts progress on a pending mission.
pub async fn handle_accept_mission(
    ctx: &Arc<GameContext>,
    player: PlayerId,
    payload: Value,
) -> Result<(), GameError> {
    let request: MissionRequest = parse(payload)?;

    let mission = {
        let mut world = ctx.world.write().await;
        let missions = world
            .missions
            .get_mut(&player)
            .ok_or_else(|| GameError::NotFound(format!("missions for {player}")))?;
        let mission = missions
            .iter_mut()
            .find(|m| m.id == request.mission_id)
            .ok_or_else(|| GameError::NotFound(format!("mission {}", request.mission_id)))?;
        if mission.progress > 0 {
            return Err(GameError::InvalidState("mission already in progress".into()));
        }
        mission.progress = 10;
        mission.started_at = Some(current_timestamp());
        mission.clone()
    };

    ctx.registry
        .send_event_to_player(&player, "mission_accepted", json!({ "mission": mission }))
        .await;

    ctx.broadcaster.push(&player).await;
    emit_leverage_changed(ctx, &player).await;
    save_world(ctx).await;
    Ok(())
}

/// Turns in a finished mission: pays the reward, credits experience, and
/// backfills the mission list.
pub async fn handle_complete_mission(
    ctx: &Arc<GameContext>,
    player: PlayerId,
    payload: Value,
) -> Result<(), GameError> {
    let request: MissionRequest = parse(payload)?;

    let (reward, leveled_up) = {
        let mut world = ctx.world.write().await;
        let missions_list = world
            .missions
            .get_mut(&player)
            .ok_or_else(|| GameError::NotFound(format!("missions for {player}")))?;
        let index = missions_list
            .iter()
            .position(|m| m.id == request.mission_id)
            .ok_or_else(|| GameError::NotFound(format!("mission {}", request.mission_id)))?;
        if !missions_list[index].is_complete() {
            return Err(GameError::InvalidState("mission not yet complete".into()));
        }
        let mission = missions_list.remove(index);

        let character = world
            .players
            .get_mut(&player)
            .ok_or_else(|| GameError::NotFound(format!("player {player}")))?;
        character.credit(mission.reward.kind, mission.reward.amount);
        let leveled_up = character.gain_experience(mission.reward.amount);
        let level = character.level;

        let mut rng = StdRng::from_entropy();
        let replacements = missions::generate_missions(&world, level, &mut rng);
        let missions_list = world.missions.entry(player.clone()).or_default();
        missions_list.extend(replacements);
        let excess = missions_list.len().saturating_sub(MAX_MISSIONS);
        missions_list.drain(..excess);

        (mission.reward, leveled_up)
    };

    info!("📋 Mission {} completed by {}", request.mission_id, player);
    ctx.registry
        .send_event_to_player(
            &player,
            "mission_completed",
            json!({
                "mission_id": request.mission_id,
                "reward": reward,
                "leveled_up": leveled_up,
            }),
        )
        .await;

    ctx.broadcaster.push(&player).await;
    emit_leverage_changed(ctx, &player).await;
    save_world(ctx).await;
    Ok(())
}

/// Generates a fresh mission batch, keeping only the latest few.
pub async fn handle_request_new_missions(
    ctx: &Arc<GameContext>,
    player: PlayerId,
) -> Result<(), GameError> {
    let (new_missions, total) = {
        let mut world = ctx.world.write().await;
        let level = world
            .players
            .get(&player)
            .map(|c| c.level)
            .ok_or_else(|| GameError::NotFound(format!("player {player}")))?;

        let mut rng = StdRng::from_entropy();
        let batch = missions::generate_missions(&world, level, &mut rng);
        let missions_list = world.missions.entry(player.clone()).or_default();
        missions_list.extend(batch.clone());
        let excess = missions_list.len().saturating_sub(MAX_MISSIONS);
        missions_list.drain(..excess);
        (batch, missions_list.len())
    };

    ctx.registry
        .send_event_to_player(
            &player,
            "new_missions_result",
            json!({
                "missions": new_missions,
                "total_missions": total,
                "message": format!("Generated {} new missions", new_missions.len()),
            }),
        )
        .await;

    ctx.broadcaster.push(&player).await;
    save_world(ctx).await;
    Ok(())
}

/// Hands an attack off to the battle coordinator.
///
/// The coordinator enforces per-target exclusivity and drives the battle
/// to completion on its own task; this handler only reports acceptance.
pub async fn handle_attack_planet(
    ctx: &Arc<GameContext>,
    player: PlayerId,
    payload: Value,
) -> Result<(), GameError> {
    let request: AttackRequest = parse(payload)?;
    ctx.coordinator
        .begin_attack(player, &request.from_id, &request.planet_id, request.amount)
        .await
}
