//! Per-connection WebSocket session (C6): a read loop and a write loop,
//! a bounded outbound queue, and the auth gate that decides whether an
//! inbound frame is answered directly or forwarded to the
//! matchmaker/match driver.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::StreamExt;
use futures::SinkExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::Authority;
use crate::matchmaker::Matchmaker;
use crate::wire::{ClientMessage, ServerMessage};

pub const LOG_TARGET: &str = "session";

const MAX_NAME_LENGTH: usize = 24;
const OUTBOUND_QUEUE_CAPACITY: usize = 256;
const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const PING_INTERVAL: Duration = Duration::from_secs(20);

/// Runs for the lifetime of one WebSocket connection. Returns once the
/// socket closes or goes idle past `READ_IDLE_TIMEOUT`.
pub async fn handle_connection(socket: WebSocket, matchmaker: Arc<Matchmaker>, authority: Arc<dyn Authority>, auth_required: bool) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE_CAPACITY);

    let writer = tokio::spawn(async move {
        let mut ping_ticker = tokio::time::interval(PING_INTERVAL);
        ping_ticker.tick().await;
        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    let Ok(text) = serde_json::to_string(&msg) else { continue };
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                _ = ping_ticker.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut state = SessionState {
        authenticated: false,
        user_id: String::new(),
        name: String::new(),
    };

    loop {
        let next = tokio::time::timeout(READ_IDLE_TIMEOUT, ws_rx.next()).await;
        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(err))) => {
                debug!(target: LOG_TARGET, %err, "websocket read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                debug!(target: LOG_TARGET, "read idle timeout, closing session");
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                handle_frame(&text, &mut state, &matchmaker, &authority, auth_required, &outbound_tx).await;
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    writer.abort();
    if state.authenticated {
        matchmaker.leave_queue(&state.user_id);
        matchmaker.notify_disconnected(&state.user_id);
    }
    info!(target: LOG_TARGET, user_id = %state.user_id, "session closed");
}

struct SessionState {
    authenticated: bool,
    user_id: String,
    name: String,
}

async fn handle_frame(
    text: &str,
    state: &mut SessionState,
    matchmaker: &Arc<Matchmaker>,
    authority: &Arc<dyn Authority>,
    auth_required: bool,
    outbound: &mpsc::Sender<ServerMessage>,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(err) => {
            warn!(target: LOG_TARGET, %err, "malformed client frame");
            let _ = outbound.try_send(ServerMessage::Error { message: "malformed message".into() });
            return;
        }
    };

    if !state.authenticated {
        match msg {
            ClientMessage::Auth { token } => authenticate(state, authority, token, outbound).await,
            ClientMessage::SetName { name } if !auth_required => {
                state.authenticated = true;
                state.user_id = format!("guest:{}", uuid::Uuid::new_v4());
                state.name = name.clone();
                dispatch_set_name(state, matchmaker, name, outbound);
            }
            _ => {
                let _ = outbound.try_send(ServerMessage::Error { message: "authentication required".into() });
            }
        }
        return;
    }

    match msg {
        ClientMessage::Auth { .. } => {}
        ClientMessage::SetName { name } => {
            dispatch_set_name(state, matchmaker, name, outbound);
        }
        ClientMessage::Rejoin { game_id, rejoin_token, name } => {
            state.name = name;
            matchmaker.rejoin_by_token(game_id, &rejoin_token, outbound.clone());
        }
        ClientMessage::RejoinMyGame {} => {
            if !matchmaker.rejoin_by_user(&state.user_id, outbound.clone()) {
                let _ = outbound.try_send(ServerMessage::Error { message: "no active game to rejoin".into() });
            }
        }
        ClientMessage::FlipCard { index } => matchmaker.send_flip_card(&state.user_id, index),
        ClientMessage::UsePowerUp { power_up_id, card_index } => {
            matchmaker.send_use_power_up(&state.user_id, power_up_id, card_index);
        }
        ClientMessage::PlayAgain {} => {
            matchmaker.enqueue(state.user_id.clone(), state.name.clone(), outbound.clone());
        }
        ClientMessage::LeaveQueue {} => matchmaker.leave_queue(&state.user_id),
        ClientMessage::LeaveGame {} => matchmaker.leave_game(&state.user_id),
    }
}

async fn authenticate(state: &mut SessionState, authority: &Arc<dyn Authority>, token: String, outbound: &mpsc::Sender<ServerMessage>) {
    match authority.validate(&token).await {
        Ok(claims) => {
            state.authenticated = true;
            state.user_id = claims.user_id;
            state.name = claims.name.and_then(|n| n.split_whitespace().next().map(str::to_string)).unwrap_or_else(|| "Player".to_string());
        }
        Err(err) => {
            let _ = outbound.try_send(ServerMessage::Error { message: err.to_string() });
        }
    }
}

fn dispatch_set_name(state: &mut SessionState, matchmaker: &Arc<Matchmaker>, name: String, outbound: &mpsc::Sender<ServerMessage>) {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LENGTH {
        let _ = outbound.try_send(ServerMessage::Error { message: "invalid name length".into() });
        return;
    }
    state.name = trimmed.to_string();
    matchmaker.enqueue(state.user_id.clone(), state.name.clone(), outbound.clone());
}
