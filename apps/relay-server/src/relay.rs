//! WebSocket handling and relay logic
//!
//! Each connection runs one handler task. Session admission, key-material
//! forwarding and envelope forwarding all go through the registry; the
//! relay itself keeps no per-session state beyond the connection map.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::HOST;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use relay_protocol::{
    shareable_link, ClientEvent, EncryptedEnvelope, Role, ServerEvent, SessionId,
};

use crate::state::{AppState, ClientHandle, ConnectionContext};

/// Expiry, fullness and unknown tokens all collapse into this message so
/// precise session state never leaks to the requester.
const ERR_SESSION_UNAVAILABLE: &str = "session not available";
const ERR_INVALID_SESSION_ID: &str = "invalid session id";

/// Why a relay attempt was refused. Non-fatal; reported to the sender.
#[derive(Debug, Error)]
enum RelayError {
    #[error("no active session")]
    NoSession,
    #[error("session is no longer valid")]
    SessionInvalid,
    #[error("not a member of this session")]
    NotAMember,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let origin = link_origin(&state, &headers);
    ws.on_upgrade(move |socket| handle_websocket(socket, state, origin))
}

/// Base address for shareable links: the configured public origin, or one
/// derived from the upgrade request's headers.
fn link_origin(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(origin) = &state.config.public_origin {
        return origin.clone();
    }
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{proto}://{host}")
}

/// Handle one WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState, origin: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerEvent>(100);

    let mut ctx = ConnectionContext::new();
    info!(connection = %ctx.connection_id, "party connected");

    state
        .connections
        .insert(ctx.connection_id, ClientHandle { tx: msg_tx.clone() });

    // Forward outbound events from the channel to the socket
    let forward_task = tokio::spawn(async move {
        while let Some(event) = msg_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Process incoming events
    while let Some(result) = ws_rx.next().await {
        let event = match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(e) => e,
                Err(e) => {
                    warn!("Invalid message format: {}", e);
                    continue;
                }
            },
            Ok(Message::Binary(data)) => match ClientEvent::from_bytes(&data) {
                Ok(e) => e,
                Err(e) => {
                    warn!("Invalid binary message: {}", e);
                    continue;
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
        };

        match event {
            ClientEvent::CreateSession => {
                create_session(&state, &mut ctx, &msg_tx, &origin).await;
            }
            ClientEvent::JoinSession { session_id } => {
                join_session(&state, &mut ctx, &msg_tx, &origin, &session_id).await;
            }
            ClientEvent::PublicKey { public_key } => {
                relay_public_key(&state, &ctx, public_key).await;
            }
            ClientEvent::Envelope { envelope } => {
                relay_envelope(&state, &ctx, &msg_tx, envelope).await;
            }
            ClientEvent::Typing { is_typing } => {
                relay_typing(&state, &ctx, is_typing).await;
            }
        }
    }

    // Cleanup on disconnect
    info!(connection = %ctx.connection_id, "party disconnected");
    leave_session(&state, &mut ctx).await;
    state.connections.remove(&ctx.connection_id);

    forward_task.abort();
}

/// Open a fresh session with the caller as its first participant.
///
/// Runs through the same admission path as join, so the link-issuance rule
/// (whoever is alone in the session gets the link) lives in one place.
async fn create_session(
    state: &AppState,
    ctx: &mut ConnectionContext,
    tx: &mpsc::Sender<ServerEvent>,
    origin: &str,
) {
    leave_session(state, ctx).await;

    let session_id = state.registry.create();
    match state.registry.admit(&session_id, ctx.connection_id) {
        Ok(Role::Initiator) => {
            ctx.session_id = Some(session_id.clone());
            let shareable_link = shareable_link(origin, &session_id);
            let _ = tx
                .send(ServerEvent::SessionCreated {
                    session_id,
                    shareable_link,
                })
                .await;
        }
        // a freshly created session admits its creator; anything else means
        // the registry evicted it between the two calls
        other => {
            warn!(session = %session_id, ?other, "admission into fresh session failed");
            let _ = tx
                .send(ServerEvent::Error {
                    message: ERR_SESSION_UNAVAILABLE.to_string(),
                })
                .await;
        }
    }
}

/// Admit the caller into an existing session.
async fn join_session(
    state: &AppState,
    ctx: &mut ConnectionContext,
    tx: &mpsc::Sender<ServerEvent>,
    origin: &str,
    token: &str,
) {
    // malformed tokens are rejected before any registry lookup
    let session_id: SessionId = match token.parse() {
        Ok(id) => id,
        Err(_) => {
            let _ = tx
                .send(ServerEvent::Error {
                    message: ERR_INVALID_SESSION_ID.to_string(),
                })
                .await;
            return;
        }
    };

    leave_session(state, ctx).await;

    match state.registry.admit(&session_id, ctx.connection_id) {
        Ok(role) => {
            ctx.session_id = Some(session_id.clone());
            let link = matches!(role, Role::Initiator)
                .then(|| shareable_link(origin, &session_id));
            let _ = tx
                .send(ServerEvent::SessionJoined {
                    role,
                    shareable_link: link,
                })
                .await;

            // The joined notice doubles as the cue for an already-keyed
            // party to re-send its public key to the newcomer.
            for peer in state.registry.others(&session_id, &ctx.connection_id) {
                state
                    .send_to(
                        &peer,
                        ServerEvent::PeerJoined {
                            peer_id: ctx.connection_id,
                        },
                    )
                    .await;
            }
        }
        Err(e) => {
            debug!(session = %session_id, connection = %ctx.connection_id, %e, "join refused");
            let _ = tx
                .send(ServerEvent::Error {
                    message: ERR_SESSION_UNAVAILABLE.to_string(),
                })
                .await;
        }
    }
}

/// Common gate for all relay traffic: the sender must have a session, the
/// session must still be relay-valid, and the sender must actually be a
/// member (guards against stale or forged session association).
fn relay_checks(state: &AppState, ctx: &ConnectionContext) -> Result<SessionId, RelayError> {
    let session_id = ctx.session_id.clone().ok_or(RelayError::NoSession)?;
    if !state.registry.can_relay(&session_id) {
        return Err(RelayError::SessionInvalid);
    }
    if !state.registry.is_member(&session_id, &ctx.connection_id) {
        return Err(RelayError::NotAMember);
    }
    Ok(session_id)
}

/// Forward public key bytes to the other participant(s). The relay neither
/// inspects nor stores them; a failed check is a silent drop.
async fn relay_public_key(state: &AppState, ctx: &ConnectionContext, public_key: Vec<u8>) {
    let session_id = match relay_checks(state, ctx) {
        Ok(id) => id,
        Err(e) => {
            debug!(connection = %ctx.connection_id, %e, "key material dropped");
            return;
        }
    };

    state.registry.touch(&session_id);
    for peer in state.registry.others(&session_id, &ctx.connection_id) {
        state
            .send_to(
                &peer,
                ServerEvent::PublicKey {
                    public_key: public_key.clone(),
                },
            )
            .await;
    }
}

/// Forward one envelope verbatim. Failures go back to the sender as
/// structured errors; the envelope itself is never parsed.
async fn relay_envelope(
    state: &AppState,
    ctx: &ConnectionContext,
    tx: &mpsc::Sender<ServerEvent>,
    envelope: EncryptedEnvelope,
) {
    let session_id = match relay_checks(state, ctx) {
        Ok(id) => id,
        Err(e) => {
            let _ = tx
                .send(ServerEvent::Error {
                    message: e.to_string(),
                })
                .await;
            return;
        }
    };

    state.registry.touch(&session_id);
    // display-only; plays no part in verification
    let relay_timestamp_ms = unix_millis();

    for peer in state.registry.others(&session_id, &ctx.connection_id) {
        state
            .send_to(
                &peer,
                ServerEvent::Envelope {
                    envelope: envelope.clone(),
                    relay_timestamp_ms,
                },
            )
            .await;
    }
}

/// Forward a typing notice. Same gate as envelopes, but silent drop on any
/// failure and no ack.
async fn relay_typing(state: &AppState, ctx: &ConnectionContext, is_typing: bool) {
    let Ok(session_id) = relay_checks(state, ctx) else {
        return;
    };

    state.registry.touch(&session_id);
    for peer in state.registry.others(&session_id, &ctx.connection_id) {
        state
            .send_to(&peer, ServerEvent::Typing { is_typing })
            .await;
    }
}

/// Leave the current session, if any: drop membership (deleting an emptied
/// session) and notify the survivor.
async fn leave_session(state: &AppState, ctx: &mut ConnectionContext) {
    let Some(session_id) = ctx.session_id.take() else {
        return;
    };

    state.registry.remove(&session_id, &ctx.connection_id);
    for peer in state.registry.others(&session_id, &ctx.connection_id) {
        state
            .send_to(
                &peer,
                ServerEvent::PeerLeft {
                    peer_id: ctx.connection_id,
                },
            )
            .await;
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
