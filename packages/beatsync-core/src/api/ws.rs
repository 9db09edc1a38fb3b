//! WebSocket handler for real-time client communication (C2, C4 wiring).

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::scheduler::now_ms;
use crate::services::dispatcher;
use crate::session::Session;
use crate::wire::{ClientMessage, ServerMessage};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub room_id: String,
    pub client_id: String,
    pub username: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state, query))
}

/// Main WebSocket connection handler.
///
/// One task per connection: reads frames, stamps the NTP `t1` timestamp the
/// instant a frame is read (before parsing, so decode time never biases the
/// sample), and fans inbound frames out to either the inline NTP responder
/// or the dispatcher. Three other sources feed the same socket: the room's
/// broadcast channel, this session's own unicast queue, and a close request
/// raised by the room itself (e.g. a heartbeat timeout).
async fn handle_ws(socket: WebSocket, state: AppState, query: WsQuery) {
    let (mut sender, mut receiver) = socket.split();

    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();

    let room = state.registry.get_or_create_room(&query.room_id);
    let mut broadcast_rx = room.broadcast_receiver();

    let (unicast_tx, mut unicast_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (close_tx, mut close_rx) = mpsc::unbounded_channel();
    let session = Session::new(
        query.client_id.clone(),
        query.username.clone(),
        query.room_id.clone(),
        unicast_tx,
        close_tx,
    );

    room.add_client(session, None);
    log::info!(
        "[ws] {} joined room {} ({})",
        query.client_id,
        query.room_id,
        conn_guard.id()
    );

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let t1 = now_ms();
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::NtpRequest { t0, rtt }) => {
                                room.update_heartbeat(&query.client_id, rtt);
                                let reply = ServerMessage::NtpResponse {
                                    t0,
                                    t1,
                                    t2: now_ms(),
                                };
                                if let Some(msg) = reply.to_message() {
                                    if sender.send(msg).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Ok(message) => {
                                dispatcher::dispatch(&room, &state.music_provider, &query.client_id, message).await;
                            }
                            Err(_) => {
                                if let Some(msg) = ServerMessage::invalid_format().to_message() {
                                    let _ = sender.send(msg).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            Some(message) = unicast_rx.recv() => {
                if let Some(msg) = message.to_message() {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
            }
            Ok(event) = broadcast_rx.recv() => {
                if let Some(msg) = event.to_message() {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
            }
            Some(close) = close_rx.recv() => {
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code: close.code,
                        reason: Utf8Bytes::from(close.reason),
                    })))
                    .await;
                break;
            }
        }
    }

    room.remove_client(&query.client_id);
    log::info!(
        "[ws] {} left room {} ({})",
        query.client_id,
        query.room_id,
        conn_guard.id()
    );
}
