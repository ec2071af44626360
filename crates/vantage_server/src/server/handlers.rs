//! Connection handling logic for WebSocket clients.
//!
//! This module contains the core connection handling logic that manages
//! the lifecycle of individual client connections, including WebSocket
//! handshaking, message processing, and cleanup.

use crate::{error::ServerError, messaging::route_client_message, server::GameContext};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, trace};

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Perform WebSocket handshake
/// 2. Register the session and its transport sender with the registry
/// 3. Start message handling tasks (incoming and outgoing)
/// 4. Tear the session down when either task ends
///
/// The session stays unidentified until the client's `connect` envelope
/// arrives; the router rejects game commands before that point.
///
/// # Message Handling
///
/// The function runs two concurrent tasks:
///
/// * **Incoming**: receives frames from the client and routes them to the
///   command handlers
/// * **Outgoing**: receives frames addressed to this session from the
///   registry's broadcast channel and writes them to the socket; a write
///   failure ends the task, which is the implicit-disconnect path for
///   transport errors
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<GameContext>,
) -> Result<(), ServerError> {
    // Perform WebSocket handshake
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));
    let session_id = ctx.registry.add_session().await;
    ctx.registry.register_ws_sender(session_id, ws_sender.clone()).await;
    debug!("🔗 Session {} accepted from {}", session_id, addr);

    let mut message_receiver = ctx.registry.subscribe();
    let ws_sender_incoming = ws_sender.clone();
    let ws_sender_outgoing = ws_sender.clone();

    // Incoming message task - routes raw frames to command handlers
    let incoming_task = {
        let ctx = Arc::clone(&ctx);
        async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = route_client_message(&text, session_id, &ctx).await {
                            trace!("❌ Message routing error: {}", e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("🔌 Session {} requested close", session_id);
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        let mut ws_sender = ws_sender_incoming.lock().await;
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Err(e) => {
                        error!("WebSocket error for session {}: {}", session_id, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    };

    // Outgoing message task
    let outgoing_task = {
        let ws_sender = ws_sender_outgoing;
        async move {
            while let Ok((target_session_id, message)) = message_receiver.recv().await {
                if target_session_id == session_id {
                    let message_text = String::from_utf8_lossy(&message);
                    let mut ws_sender = ws_sender.lock().await;
                    if let Err(e) = ws_sender
                        .send(Message::Text(message_text.to_string().into()))
                        .await
                    {
                        error!("Failed to send message: {}", e);
                        break;
                    }
                }
            }
        }
    };

    // Run both tasks concurrently until one completes
    tokio::select! {
        _ = incoming_task => {},
        _ = outgoing_task => {},
    }

    ctx.registry.disconnect(session_id).await;
    Ok(())
}
