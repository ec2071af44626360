//! Message routing logic for dispatching client commands.
//!
//! This module handles the parsing and routing of incoming client messages
//! to the appropriate command handlers. The routing boundary is also the
//! error boundary: no handler failure ever terminates the session loop -
//! every failure becomes one `error` event back to the client.

use crate::error::GameError;
use crate::messaging::{commands, Envelope};
use crate::server::GameContext;
use crate::session::SessionId;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Routes a raw client frame to the appropriate command handler.
///
/// # Message Flow
///
/// 1. Parse the raw text as an [`Envelope`]
/// 2. Answer control frames (`ping`/`pong`) immediately, refreshing the
///    session's keepalive clock
/// 3. `connect` binds the session identity; every other command requires
///    an already-identified session
/// 4. Handler errors are converted to a single `error` event
pub async fn route_client_message(
    text: &str,
    session_id: SessionId,
    ctx: &Arc<GameContext>,
) -> Result<(), GameError> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            let error = GameError::Protocol(format!("invalid JSON message: {e}"));
            send_error(ctx, session_id, &error);
            return Err(error);
        }
    };

    // Control frames refresh the keepalive clock in any state.
    match envelope.kind.as_str() {
        "ping" => {
            ctx.registry.record_pong(session_id).await;
            ctx.registry.send_to_session(session_id, &Envelope::control("pong"));
            return Ok(());
        }
        "pong" => {
            ctx.registry.record_pong(session_id).await;
            return Ok(());
        }
        _ => {}
    }

    debug!("📨 Routing '{}' from session {}", envelope.kind, session_id);
    if let Err(error) = dispatch(ctx, session_id, &envelope.kind, envelope.payload).await {
        warn!("Command '{}' from session {} failed: {}", envelope.kind, session_id, error);
        send_error(ctx, session_id, &error);
    } else {
        trace!("✅ Handled '{}' from session {}", envelope.kind, session_id);
    }
    Ok(())
}

async fn dispatch(
    ctx: &Arc<GameContext>,
    session_id: SessionId,
    kind: &str,
    payload: serde_json::Value,
) -> Result<(), GameError> {
    if kind == "connect" {
        return commands::handle_connect(ctx, session_id, payload).await;
    }

    let player = ctx
        .registry
        .player_of(session_id)
        .await
        .ok_or_else(|| GameError::InvalidState("session not identified; send connect first".into()))?;

    match kind {
        "get_world" => commands::handle_get_world(ctx, session_id, player).await,
        "calculate_leverage" => commands::handle_calculate_leverage(ctx, session_id, player).await,
        "harvest_planet" => commands::handle_harvest_planet(ctx, player, payload).await,
        "claim_planet" => commands::handle_claim_planet(ctx, player, payload).await,
        "build_satellite" => commands::handle_build_satellite(ctx, player, payload).await,
        "deploy_research" => commands::handle_deploy_research(ctx, player, payload).await,
        "accept_mission" => commands::handle_accept_mission(ctx, player, payload).await,
        "complete_mission" => commands::handle_complete_mission(ctx, player, payload).await,
        "request_new_missions" => commands::handle_request_new_missions(ctx, player).await,
        "attack_planet" => commands::handle_attack_planet(ctx, player, payload).await,
        unknown => Err(GameError::Protocol(format!("unknown message type: {unknown}"))),
    }
}

fn send_error(ctx: &GameContext, session_id: SessionId, error: &GameError) {
    ctx.registry
        .send_to_session(session_id, &Envelope::event("error", json!(error.to_string())));
}
