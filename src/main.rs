use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tower_http::cors::CorsLayer;

use mayhem_server::config::{self, ServerConfig};
use mayhem_server::connection;
use mayhem_server::games::GameInput;
use mayhem_server::lobby::{self, LobbyCommand, LobbyEvent, LobbyHandle};
use mayhem_server::registry::Registry;
use mayhem_server::stats::{LogStats, StatsSink};
use mayhem_server::types::*;

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
    config: Arc<ServerConfig>,
    stats: Arc<dyn StatsSink>,
}

// ─── Routes ───────────────────────────────────────────────────────

async fn list_lobbies(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.registry.lobby_summaries())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    // The username arrives pre-validated by the auth layer in front of us.
    let username = params.get("username").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| handle_socket(socket, state, username))
}

async fn handle_socket(socket: WebSocket, state: AppState, username: String) {
    let (mut sink, mut receiver) = socket.split();

    if username.trim().is_empty() {
        if let Ok(json) = serde_json::to_string(&ServerMsg::Error { msg: "Missing username".to_string() }) {
            let _ = sink.send(Message::Text(json.into())).await;
        }
        return;
    }
    let username = username.trim().to_string();

    let conn_id = uuid::Uuid::new_v4().to_string();
    state.registry.register(&conn_id, &username);
    tracing::info!("WebSocket connected: {} user: {}", conn_id, username);

    // One writer task owns the sink; everything outbound goes through the queue.
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(256);
    let _writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sink.send(Message::Text(json.into())).await.is_err() {
                    return;
                }
            }
        }
    });

    // Lobby fan-out runs in its own pump; the inbound loop hands it a fresh
    // broadcast subscription whenever this socket changes lobby.
    let (sub_tx, sub_rx) = mpsc::channel::<Option<broadcast::Receiver<LobbyEvent>>>(8);
    let forwarder = tokio::spawn(connection::forward_events(conn_id.clone(), sub_rx, out_tx.clone()));

    // Process incoming messages
    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };

        let client_msg: ClientMsg = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid message from {}: {}", conn_id, e);
                continue;
            }
        };

        match client_msg {
            ClientMsg::CreateLobby { capacity } => {
                if state.registry.socket_lobbies.contains_key(&conn_id) {
                    send_msg(&out_tx, ServerMsg::Error {
                        msg: "Leave your current lobby first".to_string(),
                    }).await;
                    continue;
                }

                let handle = lobby::spawn_lobby(
                    state.registry.clone(),
                    state.config.clone(),
                    state.stats.clone(),
                    capacity,
                );
                join_lobby(&state, &out_tx, &sub_tx, &conn_id, &username, &handle).await;
            }

            ClientMsg::JoinLobby { lobby_id } => {
                if state.registry.socket_lobbies.contains_key(&conn_id) {
                    send_msg(&out_tx, ServerMsg::Error {
                        msg: "Leave your current lobby first".to_string(),
                    }).await;
                    continue;
                }

                let code = lobby_id.trim().to_uppercase();
                let Some(handle) = state.registry.lobbies.get(&code).map(|h| h.clone()) else {
                    send_msg(&out_tx, ServerMsg::Error {
                        msg: "Lobby not found".to_string(),
                    }).await;
                    continue;
                };

                join_lobby(&state, &out_tx, &sub_tx, &conn_id, &username, &handle).await;
            }

            ClientMsg::UpdateProfile { color, shape, username } => {
                forward(&state, &out_tx, &conn_id, LobbyCommand::UpdateProfile {
                    conn_id: conn_id.clone(),
                    color,
                    shape,
                    username,
                }).await;
            }

            ClientMsg::ToggleReady => {
                forward(&state, &out_tx, &conn_id, LobbyCommand::ToggleReady {
                    conn_id: conn_id.clone(),
                }).await;
            }

            ClientMsg::LeaveLobby => {
                if let Some(handle) = state.registry.lobby_for_socket(&conn_id) {
                    let _ = handle.cmd_tx.send(LobbyCommand::Leave { conn_id: conn_id.clone() }).await;
                }
                state.registry.socket_lobbies.remove(&conn_id);
                let _ = sub_tx.send(None).await;
            }

            ClientMsg::StartGame { test_mode } => {
                forward(&state, &out_tx, &conn_id, LobbyCommand::StartGame {
                    conn_id: conn_id.clone(),
                    test_mode,
                }).await;
            }

            ClientMsg::SubmitAnswer { answer } => {
                forward(&state, &out_tx, &conn_id, LobbyCommand::GameInput {
                    conn_id: conn_id.clone(),
                    input: GameInput::Answer { answer },
                }).await;
            }

            ClientMsg::SubmitWord { current_word, typed_word } => {
                forward(&state, &out_tx, &conn_id, LobbyCommand::GameInput {
                    conn_id: conn_id.clone(),
                    input: GameInput::Word { current_word, typed_word },
                }).await;
            }

            ClientMsg::SubmitRaceAnswer { question_index, answer_index } => {
                forward(&state, &out_tx, &conn_id, LobbyCommand::GameInput {
                    conn_id: conn_id.clone(),
                    input: GameInput::RaceAnswer { question_index, answer_index },
                }).await;
            }
        }
    }

    // Socket disconnected
    tracing::info!("WebSocket disconnected: {}", conn_id);
    forwarder.abort();

    if let Some(handle) = state.registry.lobby_for_socket(&conn_id) {
        let _ = handle.cmd_tx.send(LobbyCommand::Disconnect { conn_id: conn_id.clone() }).await;
    }
    state.registry.unregister(&conn_id);
}

/// Runs the join handshake against a lobby task. The broadcast subscription
/// is created before the command is sent, so the confirmation the lobby
/// emits cannot be missed; the socket is registered as a member only once
/// the lobby has accepted the join.
async fn join_lobby(
    state: &AppState,
    out: &mpsc::Sender<ServerMsg>,
    sub_tx: &mpsc::Sender<Option<broadcast::Receiver<LobbyEvent>>>,
    conn_id: &str,
    username: &str,
    handle: &LobbyHandle,
) -> bool {
    let event_rx = handle.event_tx.subscribe();
    let (reply_tx, reply_rx) = oneshot::channel();
    if handle
        .cmd_tx
        .send(LobbyCommand::Join {
            conn_id: conn_id.to_string(),
            username: username.to_string(),
            reply: Some(reply_tx),
        })
        .await
        .is_err()
    {
        send_msg(out, ServerMsg::Error { msg: "Lobby not found".to_string() }).await;
        return false;
    }
    let _ = sub_tx.send(Some(event_rx)).await;

    if matches!(reply_rx.await, Ok(true)) {
        state.registry.socket_lobbies.insert(conn_id.to_string(), handle.code.clone());
        true
    } else {
        // Rejected. The pump drains the refusal before dropping the
        // subscription, so the client still sees the error.
        let _ = sub_tx.send(None).await;
        false
    }
}

/// Routes a command to the sender's current lobby, or answers ERROR.
async fn forward(state: &AppState, out: &mpsc::Sender<ServerMsg>, conn_id: &str, cmd: LobbyCommand) {
    match state.registry.lobby_for_socket(conn_id) {
        Some(handle) => {
            let _ = handle.cmd_tx.send(cmd).await;
        }
        None => {
            send_msg(out, ServerMsg::Error { msg: "You are not in a lobby".to_string() }).await;
        }
    }
}

async fn send_msg(out: &mpsc::Sender<ServerMsg>, msg: ServerMsg) {
    let _ = out.send(msg).await;
}

// ─── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8000".to_string())
        .parse()
        .expect("Invalid PORT");

    let state = AppState {
        registry: Registry::new(),
        config: Arc::new(config::load()),
        stats: Arc::new(LogStats),
    };

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/lobbies", get(list_lobbies))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind");

    tracing::info!("Party game server running on port {}", port);

    axum::serve(listener, app).await.unwrap();
}
