//! Message type definitions for client-server communication.
//!
//! Every frame on the wire is a JSON [`Envelope`] of `{type, payload}`.
//! Inbound payloads deserialize into the typed request structs below;
//! anything that fails to parse is a protocol error answered with a single
//! `error` event.

use crate::world::PlayerId;
use serde::{Deserialize, Serialize};

/// The standard wire frame in both directions.
///
/// # Examples
///
/// Inbound attack command:
/// ```json
/// {
///   "type": "attack_planet",
///   "payload": { "from_id": "planet-system-0-1", "planet_id": "planet-system-1-2", "amount": 50 }
/// }
/// ```
///
/// Outbound control frame (payload omitted):
/// ```json
/// { "type": "ping" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The message type, e.g. `attack_planet` or `game_state_update`
    #[serde(rename = "type")]
    pub kind: String,

    /// The message payload as a JSON value
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Builds an event envelope with a payload.
    pub fn event(kind: &str, payload: serde_json::Value) -> Self {
        Self { kind: kind.to_string(), payload }
    }

    /// Builds a bare control frame (`ping` / `pong`).
    pub fn control(kind: &str) -> Self {
        Self { kind: kind.to_string(), payload: serde_json::Value::Null }
    }

    /// Serializes the envelope for the transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// First message of every session: binds the caller-supplied opaque
/// identity to the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub player_id: PlayerId,
}

/// `attack_planet` command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackRequest {
    pub from_id: String,
    pub planet_id: String,
    pub amount: u32,
}

/// `harvest_planet` command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestRequest {
    pub planet_id: String,
}

/// `claim_planet` command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub planet_id: String,
}

/// `build_satellite` command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteRequest {
    pub planet_id: String,
    pub cost: i64,
}

/// `deploy_research` command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub tech: String,
    pub cost: i64,
}

/// `accept_mission` / `complete_mission` command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionRequest {
    pub mission_id: String,
}
