//! Session registry: lifecycle, identity deduplication, and keepalive.
//!
//! The registry owns the set of live sessions. A session is created when a
//! WebSocket connection completes its handshake, becomes *identified* once
//! the client's `connect` envelope binds an opaque player identity to it,
//! and is torn down on disconnect, eviction, or keepalive timeout.
//!
//! Identity-to-session is at most 1:1: a new connection presenting an
//! already-active identity evicts the previous session (close frame sent,
//! keepalive cancelled) before being admitted.
//!
//! # Architecture
//!
//! * `RwLock<HashMap>` for session storage, keyed by an atomic counter
//! * A broadcast channel carries outbound frames; each connection handler
//!   subscribes and filters for its own session id
//! * One keepalive task per identified session, cancelled via its
//!   `JoinHandle` on teardown

use crate::error::GameError;
use crate::messaging::Envelope;
use crate::world::PlayerId;
use futures_util::sink::SinkExt;
use futures_util::stream::SplitSink;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::{debug, info, warn};

/// Type alias for session identifiers.
pub type SessionId = usize;

/// Shared handle to the write half of a session's WebSocket.
pub type WsSink =
    Arc<tokio::sync::Mutex<SplitSink<WebSocketStream<tokio::net::TcpStream>, Message>>>;

/// Result of binding an identity to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// The identity was bound; any previous session for it was evicted first.
    Accepted,
    /// This session is already identified; the repeat `connect` is a no-op.
    AlreadyActive,
}

/// Per-session bookkeeping.
#[derive(Debug)]
struct SessionEntry {
    /// Identity bound by the `connect` envelope; `None` until identified
    player_id: Option<PlayerId>,
    connected_at: SystemTime,
    last_ping: Instant,
    last_pong: Instant,
    keepalive: Option<JoinHandle<()>>,
}

/// Central registry for all live sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    ws_senders: RwLock<HashMap<SessionId, WsSink>>,
    next_id: std::sync::atomic::AtomicUsize,

    /// Broadcast sender for outgoing frames to specific sessions
    sender: broadcast::Sender<(SessionId, Vec<u8>)>,

    ping_interval: Duration,
    ping_timeout: Duration,
    connect_grace: Duration,
}

impl SessionRegistry {
    pub fn new(ping_interval: Duration, ping_timeout: Duration, connect_grace: Duration) -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self {
            sessions: RwLock::new(HashMap::new()),
            ws_senders: RwLock::new(HashMap::new()),
            next_id: std::sync::atomic::AtomicUsize::new(1),
            sender,
            ping_interval,
            ping_timeout,
            connect_grace,
        }
    }

    /// Admits a new, not-yet-identified session and returns its unique ID.
    pub async fn add_session(&self) -> SessionId {
        let session_id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let now = Instant::now();
        let entry = SessionEntry {
            player_id: None,
            connected_at: SystemTime::now(),
            last_ping: now,
            last_pong: now,
            keepalive: None,
        };
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, entry);
        info!("🔗 Session {} opened ({} live)", session_id, sessions.len());
        session_id
    }

    /// Registers the WebSocket sender for a session so eviction can deliver
    /// a close frame.
    pub async fn register_ws_sender(&self, session_id: SessionId, ws_sender: WsSink) {
        let mut senders = self.ws_senders.write().await;
        senders.insert(session_id, ws_sender);
    }

    /// Binds a caller-supplied identity to a session.
    ///
    /// If another live session already carries `identity`, it is evicted
    /// first (close frame, keepalive cancelled) so that identity-to-session
    /// stays at most 1:1. A short fixed grace delay runs before the binding
    /// completes, which absorbs rapid reconnect storms. On success the
    /// session's keepalive loop is started.
    pub async fn register(
        self: &Arc<Self>,
        session_id: SessionId,
        identity: PlayerId,
    ) -> ConnectStatus {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(&session_id) {
                Some(entry) if entry.player_id.is_some() => {
                    info!("Session {} already identified, ignoring repeat connect", session_id);
                    return ConnectStatus::AlreadyActive;
                }
                _ => {}
            }
        }

        // Evict any previous session for this identity.
        if let Some(old_id) = self.session_for_player(&identity).await {
            info!("⚔️ Evicting session {} superseded by a new connection for {}", old_id, identity);
            self.kick(old_id, "Replaced by a newer connection").await;
        }

        // Reconnect grace: absorbs storms from clients that reconnect in a
        // tight loop.
        if !self.connect_grace.is_zero() {
            tokio::time::sleep(self.connect_grace).await;
        }

        {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(&session_id) {
                Some(entry) => entry.player_id = Some(identity.clone()),
                // The session vanished during the grace delay.
                None => return ConnectStatus::AlreadyActive,
            }
        }

        self.start_keepalive(session_id).await;
        info!("👋 Session {} identified as {}", session_id, identity);
        ConnectStatus::Accepted
    }

    /// Spawns the keepalive loop for a session and stores its handle so
    /// teardown can cancel it.
    async fn start_keepalive(self: &Arc<Self>, session_id: SessionId) {
        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            registry.run_keepalive(session_id).await;
        });

        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(&session_id) {
            if let Some(previous) = entry.keepalive.replace(handle) {
                previous.abort();
            }
        } else {
            handle.abort();
        }
    }

    /// The keepalive state machine: `Active -> AwaitingPong -> Active`.
    ///
    /// Each cycle sleeps for the ping interval, sends a ping, arms the pong
    /// deadline, and disconnects the session if no pong was recorded after
    /// the ping was sent. Any inbound pong (or client-initiated ping)
    /// refreshes `last_pong` regardless of where this loop currently is.
    async fn run_keepalive(self: Arc<Self>, session_id: SessionId) {
        loop {
            tokio::time::sleep(self.ping_interval).await;
            if !self.is_active(session_id).await {
                break;
            }

            {
                let mut sessions = self.sessions.write().await;
                match sessions.get_mut(&session_id) {
                    Some(entry) => entry.last_ping = Instant::now(),
                    None => break,
                }
            }
            self.send_to_session(session_id, &Envelope::control("ping"));

            tokio::time::sleep(self.ping_timeout).await;
            match self.ping_state(session_id).await {
                None => break,
                // No pong has landed since the ping went out: evict.
                Some((last_ping, last_pong)) if last_pong < last_ping => {
                    warn!("⏱️ Ping timeout for session {}", session_id);
                    self.disconnect(session_id).await;
                    break;
                }
                Some(_) => {}
            }
        }
    }

    /// Records an inbound pong (or client ping) for the session.
    pub async fn record_pong(&self, session_id: SessionId) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(&session_id) {
            entry.last_pong = Instant::now();
        }
    }

    async fn ping_state(&self, session_id: SessionId) -> Option<(Instant, Instant)> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session_id)
            .map(|entry| (entry.last_ping, entry.last_pong))
    }

    /// Whether the session is still present in the registry.
    pub async fn is_active(&self, session_id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&session_id)
    }

    /// The identity bound to a session, if it has been identified.
    pub async fn player_of(&self, session_id: SessionId) -> Option<PlayerId> {
        let sessions = self.sessions.read().await;
        sessions.get(&session_id).and_then(|entry| entry.player_id.clone())
    }

    /// Finds the live session for a player identity.
    pub async fn session_for_player(&self, player: &PlayerId) -> Option<SessionId> {
        let sessions = self.sessions.read().await;
        for (session_id, entry) in sessions.iter() {
            if entry.player_id.as_ref() == Some(player) {
                return Some(*session_id);
            }
        }
        None
    }

    /// Evicts a session, delivering a close frame with the given reason
    /// before tearing it down.
    pub async fn kick(&self, session_id: SessionId, reason: &str) {
        let sink = {
            let senders = self.ws_senders.read().await;
            senders.get(&session_id).cloned()
        };
        if let Some(sink) = sink {
            use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
            let close = Message::Close(Some(tokio_tungstenite::tungstenite::protocol::CloseFrame {
                code: CloseCode::Normal,
                reason: reason.to_string().into(),
            }));
            let mut sink = sink.lock().await;
            let _ = sink.send(close).await;
        }
        self.disconnect(session_id).await;
    }

    /// Tears a session down: cancels its keepalive, removes it from the
    /// registry, and drops the transport sender. Idempotent - calling it
    /// again for a gone session is a no-op.
    pub async fn disconnect(&self, session_id: SessionId) {
        let entry = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(&session_id)
        };
        let Some(entry) = entry else {
            return;
        };

        if let Some(keepalive) = entry.keepalive {
            keepalive.abort();
        }
        {
            let mut senders = self.ws_senders.write().await;
            senders.remove(&session_id);
        }

        let uptime = entry
            .connected_at
            .elapsed()
            .unwrap_or_default()
            .as_secs();
        info!(
            "❌ Session {} closed after {}s ({})",
            session_id,
            uptime,
            entry
                .player_id
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unidentified".to_string())
        );
    }

    /// Queues a frame for delivery to a specific session.
    ///
    /// Delivery is best-effort: a send failure (no live receiver) is logged
    /// and swallowed, mirroring the implicit-disconnect policy for
    /// transport errors.
    pub fn send_to_session(&self, session_id: SessionId, envelope: &Envelope) -> bool {
        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize {} frame: {}", envelope.kind, e);
                return false;
            }
        };
        if self.sender.send((session_id, bytes)).is_err() {
            debug!("No live receiver for session {}, dropping {} frame", session_id, envelope.kind);
            return false;
        }
        true
    }

    /// Delivers an event to whatever session a player currently holds.
    ///
    /// Returns `false` when the player has no live session; battles keep
    /// running regardless, their sends simply fail silently.
    pub async fn send_event_to_player(
        &self,
        player: &PlayerId,
        kind: &str,
        payload: serde_json::Value,
    ) -> bool {
        match self.session_for_player(player).await {
            Some(session_id) => self.send_to_session(session_id, &Envelope::event(kind, payload)),
            None => {
                debug!("Player {} has no live session, dropping {} event", player, kind);
                false
            }
        }
    }

    /// Typed error variant of [`SessionRegistry::send_event_to_player`] for
    /// callers that surface `Transient` failures.
    pub async fn try_send_event_to_player(
        &self,
        player: &PlayerId,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<(), GameError> {
        if self.send_event_to_player(player, kind, payload).await {
            Ok(())
        } else {
            Err(GameError::Transient(format!("no live session for {player}")))
        }
    }

    /// Creates a new receiver for outgoing frames. Each connection handler
    /// calls this and filters for its own session id.
    pub fn subscribe(&self) -> broadcast::Receiver<(SessionId, Vec<u8>)> {
        self.sender.subscribe()
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Duration::from_secs(45),
            Duration::from_secs(15),
            Duration::ZERO,
        ))
    }

    #[tokio::test]
    async fn test_register_binds_identity() {
        let registry = test_registry();
        let session = registry.add_session().await;

        let status = registry.register(session, PlayerId::from("alice")).await;
        assert_eq!(status, ConnectStatus::Accepted);
        assert_eq!(registry.player_of(session).await, Some(PlayerId::from("alice")));
        assert_eq!(registry.session_for_player(&PlayerId::from("alice")).await, Some(session));
    }

    #[tokio::test]
    async fn test_repeat_connect_is_already_active() {
        let registry = test_registry();
        let session = registry.add_session().await;

        registry.register(session, PlayerId::from("alice")).await;
        let status = registry.register(session, PlayerId::from("alice")).await;
        assert_eq!(status, ConnectStatus::AlreadyActive);
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_new_connection_evicts_previous_session() {
        let registry = test_registry();
        let alice = PlayerId::from("alice");

        let first = registry.add_session().await;
        registry.register(first, alice.clone()).await;

        let second = registry.add_session().await;
        let status = registry.register(second, alice.clone()).await;

        assert_eq!(status, ConnectStatus::Accepted);
        assert!(!registry.is_active(first).await, "old session must be evicted");
        assert_eq!(registry.session_for_player(&alice).await, Some(second));
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let registry = test_registry();
        let session = registry.add_session().await;
        registry.register(session, PlayerId::from("alice")).await;

        registry.disconnect(session).await;
        registry.disconnect(session).await;
        assert!(!registry.is_active(session).await);
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_keepalive_disconnects_without_pong() {
        let registry = Arc::new(SessionRegistry::new(
            Duration::from_millis(20),
            Duration::from_millis(20),
            Duration::ZERO,
        ));
        let session = registry.add_session().await;
        registry.register(session, PlayerId::from("alice")).await;

        // Keep a subscriber alive so ping frames have somewhere to go.
        let _rx = registry.subscribe();

        // No pong ever arrives: the keepalive loop must evict the session.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!registry.is_active(session).await);
    }

    #[tokio::test]
    async fn test_keepalive_survives_with_pongs() {
        let registry = Arc::new(SessionRegistry::new(
            Duration::from_millis(20),
            Duration::from_millis(20),
            Duration::ZERO,
        ));
        let session = registry.add_session().await;
        registry.register(session, PlayerId::from("alice")).await;
        let _rx = registry.subscribe();

        // Pong faster than the deadline; the session must stay alive
        // through several keepalive cycles.
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(15)).await;
            registry.record_pong(session).await;
        }
        assert!(registry.is_active(session).await);
        registry.disconnect(session).await;
    }

    #[tokio::test]
    async fn test_send_event_reaches_subscriber() {
        let registry = test_registry();
        let session = registry.add_session().await;
        registry.register(session, PlayerId::from("alice")).await;

        let mut rx = registry.subscribe();
        let delivered = registry
            .send_event_to_player(
                &PlayerId::from("alice"),
                "connection_status",
                serde_json::json!({"status": "connected"}),
            )
            .await;
        assert!(delivered);

        let (target, bytes) = rx.recv().await.unwrap();
        assert_eq!(target, session);
        let envelope: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope.kind, "connection_status");
    }

    #[tokio::test]
    async fn test_send_to_unknown_player_fails_softly() {
        let registry = test_registry();
        let _rx = registry.subscribe();
        let delivered = registry
            .send_event_to_player(&PlayerId::from("ghost"), "battle_update", serde_json::json!({}))
            .await;
        assert!(!delivered);

        let typed = registry
            .try_send_event_to_player(&PlayerId::from("ghost"), "battle_update", serde_json::json!({}))
            .await;
        assert!(matches!(typed, Err(GameError::Transient(_))));
    }
}
