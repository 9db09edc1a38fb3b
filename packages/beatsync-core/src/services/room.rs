//! Room state machine (C5) — the core of the system.
//!
//! A `Room`'s mutable state lives behind a single `parking_lot::Mutex`, the
//! one logical serialization point spec.md §5 requires. Handlers take the
//! lock, mutate, collect whatever broadcasts/unicasts the mutation implies,
//! drop the lock, then actually send — so a slow or misbehaving socket write
//! never holds the room hostage.

use std::collections::{HashMap, HashSet, VecDeque};
use std::f64::consts::PI;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::BeatsyncResult;
use crate::events::{BroadcastEventBridge, EventEmitter, RoomLifecycleEvent};
use crate::model::{
    ChatMessage, Client, ClientLocation, PendingLoadBarrier, PermissionMode, PlayAction,
    PlaybackState, Position,
};
use crate::protocol_constants::{
    CHAT_HISTORY_CAPACITY, CLIENT_CIRCLE_RADIUS, GRID_ORIGIN_X, GRID_ORIGIN_Y,
    HEARTBEAT_RESPONSE_TIMEOUT_MS, HEARTBEAT_STEADY_INTERVAL_MS, HEARTBEAT_TIMEOUT_CLOSE_CODE,
    HEARTBEAT_TIMEOUT_CLOSE_REASON, LISTENING_SOURCE_CIRCLE_RADIUS, LOAD_BARRIER_DEADLINE_MS,
    ROOM_BROADCAST_CHANNEL_CAPACITY, ROOM_CLEANUP_GRACE_SECS, RTT_SMOOTHING_ALPHA,
    SPATIAL_RAMP_TIME_SECS, SPATIAL_TICK_INTERVAL_MS, SYNC_EXTRA_MS,
};
use crate::runtime::TaskSpawner;
use crate::scheduler::{now_ms, scheduled_execution_time};
use crate::services::backup::RoomSnapshot;
use crate::services::registry::GlobalRegistry;
use crate::services::spatial::compute_gains;
use crate::services::storage::BlobStore;
use crate::session::Session;
use crate::wire::{RoomEvent, ScheduledAction, ServerMessage};

/// A record of a device that has joined a room, kept around after it
/// disconnects so a reconnect restores identity instead of starting fresh.
#[derive(Debug, Clone)]
struct ClientRecord {
    username: String,
    joined_at: u64,
    last_heartbeat_at: u64,
    rtt: u64,
    is_admin: bool,
    position: Position,
    location: Option<ClientLocation>,
}

struct RoomState {
    clients: HashMap<String, ClientRecord>,
    connected: HashSet<String>,
    queue: Vec<String>,
    playback_state: PlaybackState,
    listening_source: Position,
    spatial_active: bool,
    permissions: PermissionMode,
    global_volume: f32,
    chat: VecDeque<ChatMessage>,
    next_chat_id: u64,
    pending_load_barrier: Option<PendingLoadBarrier>,
}

impl RoomState {
    fn new() -> Self {
        Self {
            clients: HashMap::new(),
            connected: HashSet::new(),
            queue: Vec::new(),
            playback_state: PlaybackState::initial(),
            listening_source: Position {
                x: GRID_ORIGIN_X,
                y: GRID_ORIGIN_Y,
            },
            spatial_active: false,
            permissions: PermissionMode::Everyone,
            global_volume: 1.0,
            chat: VecDeque::with_capacity(CHAT_HISTORY_CAPACITY),
            next_chat_id: 1,
            pending_load_barrier: None,
        }
    }

    fn connected_clients(&self) -> Vec<Client> {
        self.connected
            .iter()
            .filter_map(|id| self.clients.get(id).map(|rec| to_client(id, rec)))
            .collect()
    }

    fn reposition_connected(&mut self) {
        let ids: Vec<String> = self.connected.iter().cloned().collect();
        let n = ids.len();
        for (i, id) in ids.iter().enumerate() {
            let position = if n <= 1 {
                Position {
                    x: GRID_ORIGIN_X,
                    y: GRID_ORIGIN_Y,
                }
            } else {
                let angle = 2.0 * PI * (i as f64) / (n as f64) - PI / 2.0;
                Position {
                    x: GRID_ORIGIN_X + CLIENT_CIRCLE_RADIUS * angle.cos(),
                    y: GRID_ORIGIN_Y + CLIENT_CIRCLE_RADIUS * angle.sin(),
                }
            };
            if let Some(rec) = self.clients.get_mut(id) {
                rec.position = position;
            }
        }
    }
}

fn to_client(client_id: &str, rec: &ClientRecord) -> Client {
    Client {
        client_id: client_id.to_string(),
        username: rec.username.clone(),
        joined_at: rec.joined_at,
        last_heartbeat_at: rec.last_heartbeat_at,
        rtt: rec.rtt,
        is_admin: rec.is_admin,
        position: rec.position,
        location: rec.location.clone(),
    }
}

/// A single synchronized-playback room. Owns no socket; only `Session`
/// handles, a broadcast channel, and the mutation lock.
pub struct Room {
    pub room_id: String,
    state: Mutex<RoomState>,
    connected_sessions: Mutex<HashMap<String, Session>>,
    broadcast_tx: broadcast::Sender<ServerMessage>,
    blob_store: Arc<dyn BlobStore>,
    spawner: Arc<dyn TaskSpawner>,
    event_bridge: Arc<BroadcastEventBridge>,
    registry: Weak<GlobalRegistry>,
    heartbeat_task: Mutex<Option<CancellationToken>>,
    spatial_task: Mutex<Option<CancellationToken>>,
    load_barrier_task: Mutex<Option<CancellationToken>>,
    cleanup_task: Mutex<Option<CancellationToken>>,
}

impl Room {
    pub fn new(
        room_id: String,
        blob_store: Arc<dyn BlobStore>,
        spawner: Arc<dyn TaskSpawner>,
        event_bridge: Arc<BroadcastEventBridge>,
        registry: Weak<GlobalRegistry>,
    ) -> Arc<Self> {
        let (broadcast_tx, _rx) = broadcast::channel(ROOM_BROADCAST_CHANNEL_CAPACITY);
        Arc::new(Self {
            room_id,
            state: Mutex::new(RoomState::new()),
            connected_sessions: Mutex::new(HashMap::new()),
            broadcast_tx,
            blob_store,
            spawner,
            event_bridge,
            registry,
            heartbeat_task: Mutex::new(None),
            spatial_task: Mutex::new(None),
            load_barrier_task: Mutex::new(None),
            cleanup_task: Mutex::new(None),
        })
    }

    /// Rebuilds a room from a persisted snapshot with no live sessions
    /// enrolled (C9 startup restore).
    pub fn restore(
        room_id: String,
        snapshot: RoomSnapshot,
        blob_store: Arc<dyn BlobStore>,
        spawner: Arc<dyn TaskSpawner>,
        event_bridge: Arc<BroadcastEventBridge>,
        registry: Weak<GlobalRegistry>,
    ) -> Arc<Self> {
        let room = Self::new(room_id, blob_store, spawner, event_bridge, registry);
        {
            let mut state = room.state.lock();
            for client in snapshot.client_datas {
                state.clients.insert(
                    client.client_id.clone(),
                    ClientRecord {
                        username: client.username,
                        joined_at: client.joined_at,
                        last_heartbeat_at: client.last_heartbeat_at,
                        rtt: client.rtt,
                        is_admin: client.is_admin,
                        position: client.position,
                        location: client.location,
                    },
                );
            }
            state.queue = snapshot.audio_sources;
            state.global_volume = snapshot.global_volume;
            if let Some(playback_state) = snapshot.playback_state {
                state.playback_state = playback_state;
            }
            if let Some(chat) = snapshot.chat {
                state.chat = chat.messages.into();
                state.next_chat_id = chat.next_message_id;
            }
        }
        room
    }

    pub fn broadcast_receiver(&self) -> broadcast::Receiver<ServerMessage> {
        self.broadcast_tx.subscribe()
    }

    fn broadcast(&self, message: ServerMessage) {
        let _ = self.broadcast_tx.send(message);
    }

    fn unicast(&self, client_id: &str, message: ServerMessage) {
        if let Some(session) = self.connected_sessions.lock().get(client_id) {
            session.send(message);
        }
    }

    /// Sends a one-off frame to a single connected client, e.g. a search or
    /// stream-resolution reply that has no other delivery path.
    pub fn send_to_client(&self, client_id: &str, message: ServerMessage) {
        self.unicast(client_id, message);
    }

    /// Sends an `ERROR` frame to a single client without closing the socket.
    pub fn send_error(&self, client_id: &str, message: impl Into<String>) {
        self.unicast(client_id, ServerMessage::error(message));
    }

    // ── 4.5.1 Membership & admin ──────────────────────────────────────────

    pub fn add_client(self: &Arc<Self>, session: Session, location: Option<ClientLocation>) {
        self.cancel_cleanup();
        let client_id = session.client_id.clone();

        {
            let mut state = self.state.lock();
            let had_any_connected = !state.connected.is_empty();
            match state.clients.get_mut(&client_id) {
                Some(rec) => {
                    rec.username = session.username.clone();
                    if location.is_some() {
                        rec.location = location;
                    }
                }
                None => {
                    state.clients.insert(
                        client_id.clone(),
                        ClientRecord {
                            username: session.username.clone(),
                            joined_at: now_ms(),
                            last_heartbeat_at: now_ms(),
                            rtt: 0,
                            is_admin: !had_any_connected,
                            position: Position {
                                x: GRID_ORIGIN_X,
                                y: GRID_ORIGIN_Y - CLIENT_CIRCLE_RADIUS,
                            },
                            location,
                        },
                    );
                }
            }
            state.connected.insert(client_id.clone());
            state.reposition_connected();
        }

        self.connected_sessions.lock().insert(client_id.clone(), session);
        self.start_heartbeat_sweeper();
        self.broadcast_client_change();
        self.send_initial_state(&client_id);
        self.send_full_chat(&client_id);
        self.event_bridge.emit(RoomLifecycleEvent::ClientJoined {
            room_id: self.room_id.clone(),
            client_id,
            timestamp: now_ms(),
        });
    }

    pub fn remove_client(self: &Arc<Self>, client_id: &str) {
        self.connected_sessions.lock().remove(client_id);

        let mut barrier_completed_now = false;
        let mut promoted_admin = None;
        {
            let mut state = self.state.lock();
            state.connected.remove(client_id);
            state.reposition_connected();

            if !state.connected.iter().any(|id| {
                state
                    .clients
                    .get(id)
                    .map(|rec| rec.is_admin)
                    .unwrap_or(false)
            }) {
                let candidate = pick_random(&state.connected);
                if let Some(new_admin) = candidate {
                    for id in state.connected.clone() {
                        if let Some(rec) = state.clients.get_mut(&id) {
                            rec.is_admin = id == new_admin;
                        }
                    }
                    promoted_admin = Some(new_admin);
                }
            }

            if let Some(barrier) = state.pending_load_barrier.as_mut() {
                barrier.loaded_set.remove(client_id);
            }
            if let Some(barrier) = &state.pending_load_barrier {
                barrier_completed_now = state.connected.iter().all(|id| barrier.loaded_set.contains(id));
            }
        }

        if barrier_completed_now {
            self.commit_play();
        }

        self.broadcast_client_change();

        self.event_bridge.emit(RoomLifecycleEvent::ClientLeft {
            room_id: self.room_id.clone(),
            client_id: client_id.to_string(),
            timestamp: now_ms(),
        });
        if let Some(new_admin) = promoted_admin {
            self.event_bridge.emit(RoomLifecycleEvent::AdminPromoted {
                room_id: self.room_id.clone(),
                client_id: new_admin,
                timestamp: now_ms(),
            });
        }

        let still_connected = !self.state.lock().connected.is_empty();
        if !still_connected {
            self.stop_heartbeat_sweeper();
            self.schedule_cleanup();
        }
    }

    pub fn require_can_mutate(&self, client_id: &str) -> bool {
        let state = self.state.lock();
        if state.permissions == PermissionMode::Everyone {
            return true;
        }
        state
            .clients
            .get(client_id)
            .map(|rec| rec.is_admin)
            .unwrap_or(false)
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.state.lock().connected.contains(client_id)
    }

    pub fn has_connected_clients(&self) -> bool {
        !self.state.lock().connected.is_empty()
    }

    pub fn set_admin(&self, client_id: &str, is_admin: bool) {
        let mut state = self.state.lock();
        if let Some(rec) = state.clients.get_mut(client_id) {
            rec.is_admin = is_admin;
        }
        drop(state);
        self.broadcast_client_change();
        if is_admin {
            self.event_bridge.emit(RoomLifecycleEvent::AdminPromoted {
                room_id: self.room_id.clone(),
                client_id: client_id.to_string(),
                timestamp: now_ms(),
            });
        }
    }

    /// Called on every received NTP request (spec.md §4.2: "every received
    /// NTP request updates `lastHeartbeatAt`"). `rtt_sample_ms` is `None` on
    /// the handshake frames a client sends before it has a round-trip sample
    /// of its own to report; once the client starts periodically reporting
    /// its rtt, smoothing kicks in.
    pub fn update_heartbeat(&self, client_id: &str, rtt_sample_ms: Option<u64>) {
        let mut state = self.state.lock();
        if let Some(rec) = state.clients.get_mut(client_id) {
            rec.last_heartbeat_at = now_ms();
            if let Some(sample) = rtt_sample_ms {
                rec.rtt = if rec.rtt == 0 {
                    sample
                } else {
                    ((RTT_SMOOTHING_ALPHA * sample as f64)
                        + ((1.0 - RTT_SMOOTHING_ALPHA) * rec.rtt as f64)) as u64
                };
            }
        }
    }

    fn broadcast_client_change(&self) {
        let clients = self.state.lock().connected_clients();
        self.broadcast(ServerMessage::RoomEvent {
            event: RoomEvent::ClientChange { clients },
        });
    }

    fn send_initial_state(&self, client_id: &str) {
        let state = self.state.lock();
        let message = ServerMessage::InitialState {
            clients: state.connected_clients(),
            audio_sources: state.queue.clone(),
            playback_state: state.playback_state.clone(),
            global_volume: state.global_volume,
        };
        drop(state);
        self.unicast(client_id, message);
    }

    // ── 4.5.2 Scheduled play/pause ────────────────────────────────────────

    pub fn handle_play(self: &Arc<Self>, initiator_id: &str, play_action: PlayAction) {
        let starts_barrier = {
            let mut state = self.state.lock();
            if !state.queue.contains(&play_action.audio_source) {
                log::warn!(
                    "[room {}] PLAY for unknown audioSource {}",
                    self.room_id,
                    play_action.audio_source
                );
                return;
            }
            state.pending_load_barrier = Some(PendingLoadBarrier {
                play_action: play_action.clone(),
                initiator_id: initiator_id.to_string(),
                loaded_set: [initiator_id.to_string()].into_iter().collect(),
                deadline_ms: now_ms() + LOAD_BARRIER_DEADLINE_MS,
            });
            true
        };

        if starts_barrier {
            self.broadcast(ServerMessage::RoomEvent {
                event: RoomEvent::LoadAudioSource {
                    audio_source_to_play: play_action.audio_source.clone(),
                },
            });
            self.start_load_barrier_timer();
        }
    }

    pub fn handle_audio_source_loaded(self: &Arc<Self>, client_id: &str, url: &str) {
        let should_commit = {
            let mut state = self.state.lock();
            let matches_pending = matches!(
                &state.pending_load_barrier,
                Some(barrier) if barrier.play_action.audio_source == url
            );
            if !matches_pending {
                false
            } else {
                if let Some(barrier) = state.pending_load_barrier.as_mut() {
                    barrier.loaded_set.insert(client_id.to_string());
                }
                let barrier = state.pending_load_barrier.as_ref().unwrap();
                state.connected.iter().all(|id| barrier.loaded_set.contains(id))
            }
        };
        if should_commit {
            self.commit_play();
        }
    }

    fn commit_play(&self) {
        let (message, audio_source) = {
            let mut state = self.state.lock();
            let Some(barrier) = state.pending_load_barrier.take() else {
                return;
            };
            if !state.queue.contains(&barrier.play_action.audio_source) {
                log::warn!(
                    "[room {}] load barrier committed for a track no longer in queue",
                    self.room_id
                );
                return;
            }
            let server_time_to_execute = scheduled_execution_time(self.max_rtt_locked(&state), 0);
            state.playback_state = PlaybackState::Playing {
                audio_source: barrier.play_action.audio_source.clone(),
                server_time_to_execute,
                track_position_seconds: barrier.play_action.track_position_seconds,
            };
            let audio_source = barrier.play_action.audio_source.clone();
            let message = ServerMessage::ScheduledAction {
                server_time_to_execute,
                scheduled_action: ScheduledAction::Play {
                    audio_source: barrier.play_action.audio_source,
                    track_time_seconds: barrier.play_action.track_position_seconds,
                },
            };
            (message, audio_source)
        };
        self.cancel_load_barrier_timer();
        self.broadcast(message);
        self.event_bridge.emit(RoomLifecycleEvent::Play {
            room_id: self.room_id.clone(),
            audio_source,
            timestamp: now_ms(),
        });
    }

    fn max_rtt_locked(&self, state: &RoomState) -> u64 {
        state
            .connected
            .iter()
            .filter_map(|id| state.clients.get(id).map(|rec| rec.rtt))
            .max()
            .unwrap_or(0)
    }

    pub fn handle_pause(&self) {
        let message = {
            let mut state = self.state.lock();
            state.pending_load_barrier = None;
            let audio_source = state.playback_state.audio_source().to_string();
            let server_time_to_execute = scheduled_execution_time(self.max_rtt_locked(&state), 0);
            state.playback_state = PlaybackState::Paused {
                audio_source,
                track_position_seconds: current_track_position(&state.playback_state),
            };
            ServerMessage::ScheduledAction {
                server_time_to_execute,
                scheduled_action: ScheduledAction::Pause,
            }
        };
        self.cancel_load_barrier_timer();
        self.broadcast(message);
        self.event_bridge.emit(RoomLifecycleEvent::Pause {
            room_id: self.room_id.clone(),
            timestamp: now_ms(),
        });
    }

    // ── 4.5.3 Late-joiner sync ─────────────────────────────────────────────

    pub fn handle_sync(&self, client_id: &str) {
        let message = {
            let state = self.state.lock();
            match &state.playback_state {
                PlaybackState::Paused { .. } => None,
                PlaybackState::Playing {
                    audio_source,
                    server_time_to_execute,
                    track_position_seconds,
                } => {
                    let new_execute = scheduled_execution_time(self.max_rtt_locked(&state), SYNC_EXTRA_MS);
                    let elapsed_since_start =
                        (new_execute as f64 - *server_time_to_execute as f64) / 1000.0;
                    Some(ServerMessage::ScheduledAction {
                        server_time_to_execute: new_execute,
                        scheduled_action: ScheduledAction::Play {
                            audio_source: audio_source.clone(),
                            track_time_seconds: track_position_seconds + elapsed_since_start,
                        },
                    })
                }
            }
        };
        if let Some(message) = message {
            self.unicast(client_id, message);
        }
    }

    // ── 4.5.4 Queue mutation ──────────────────────────────────────────────

    pub fn set_audio_sources(&self, urls: Vec<String>) {
        {
            let mut state = self.state.lock();
            state.queue = urls.clone();
        }
        self.broadcast(ServerMessage::RoomEvent {
            event: RoomEvent::SetAudioSources { sources: urls },
        });
    }

    pub fn remove_audio_sources(&self, urls: &[String]) {
        let (remaining, reset_playback) = {
            let mut state = self.state.lock();
            state.queue.retain(|u| !urls.contains(u));
            let current_removed = urls.contains(&state.playback_state.audio_source().to_string())
                && !state.playback_state.audio_source().is_empty();
            if current_removed {
                state.playback_state = PlaybackState::initial();
                state.pending_load_barrier = None;
            }
            (state.queue.clone(), current_removed)
        };
        if reset_playback {
            self.cancel_load_barrier_timer();
        }
        self.broadcast(ServerMessage::RoomEvent {
            event: RoomEvent::SetAudioSources { sources: remaining },
        });
    }

    /// Deletes the underlying blobs for `urls` that belong to this room,
    /// then removes only the ones that were actually deleted (or were never
    /// blob-owned) from the queue (§4.5.4).
    pub async fn delete_audio_sources(&self, urls: Vec<String>) -> BeatsyncResult<()> {
        let room_prefix = format!("/room-{}/", self.room_id);
        let mut removed = Vec::with_capacity(urls.len());
        for url in urls {
            if !url.contains(&room_prefix) {
                removed.push(url);
                continue;
            }
            match self.blob_store.delete(&url).await {
                Ok(()) => removed.push(url),
                Err(e) => {
                    log::warn!("[room {}] failed to delete blob {url}: {e}", self.room_id);
                }
            }
        }
        if !removed.is_empty() {
            self.remove_audio_sources(&removed);
        }
        Ok(())
    }

    // ── 4.5.5 Spatial loop ─────────────────────────────────────────────────

    pub fn start_spatial_audio(self: &Arc<Self>) {
        if self.spatial_task.lock().is_some() {
            return;
        }
        self.state.lock().spatial_active = true;
        let token = CancellationToken::new();
        *self.spatial_task.lock() = Some(token.clone());

        let weak = Arc::downgrade(self);
        self.spawner.spawn(async move {
            let mut tick: u64 = 0;
            let mut interval = tokio::time::interval(Duration::from_millis(SPATIAL_TICK_INTERVAL_MS));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(room) = weak.upgrade() else { break };
                        room.spatial_tick(tick);
                        tick += 1;
                    }
                }
            }
        });
    }

    pub fn stop_spatial_audio(&self) {
        self.state.lock().spatial_active = false;
        if let Some(token) = self.spatial_task.lock().take() {
            token.cancel();
        }
        self.broadcast(ServerMessage::ScheduledAction {
            server_time_to_execute: now_ms(),
            scheduled_action: ScheduledAction::StopSpatialAudio,
        });
    }

    fn spatial_tick(&self, tick: u64) {
        let angle = tick as f64 * PI / 30.0;
        let source = Position {
            x: GRID_ORIGIN_X + LISTENING_SOURCE_CIRCLE_RADIUS * angle.cos(),
            y: GRID_ORIGIN_Y + LISTENING_SOURCE_CIRCLE_RADIUS * angle.sin(),
        };
        let (clients, rtt) = {
            let mut state = self.state.lock();
            state.listening_source = source;
            (state.connected_clients(), self.max_rtt_locked(&state))
        };
        let gains = compute_gains(&clients, source);
        self.broadcast(ServerMessage::ScheduledAction {
            server_time_to_execute: scheduled_execution_time(rtt, 0),
            scheduled_action: ScheduledAction::SpatialConfig {
                listening_source: source,
                gains,
                ramp_time: SPATIAL_RAMP_TIME_SECS,
            },
        });
    }

    /// Emits a one-shot `SPATIAL_CONFIG` snapshot even if the loop is off,
    /// so `MOVE_CLIENT` / `SET_LISTENING_SOURCE` / `REORDER_CLIENT` still
    /// produce an immediate, correct mix.
    fn emit_spatial_snapshot(&self) {
        let (clients, source, rtt) = {
            let state = self.state.lock();
            (
                state.connected_clients(),
                state.listening_source,
                self.max_rtt_locked(&state),
            )
        };
        let gains = compute_gains(&clients, source);
        self.broadcast(ServerMessage::ScheduledAction {
            server_time_to_execute: scheduled_execution_time(rtt, 0),
            scheduled_action: ScheduledAction::SpatialConfig {
                listening_source: source,
                gains,
                ramp_time: SPATIAL_RAMP_TIME_SECS,
            },
        });
    }

    pub fn move_client(&self, client_id: &str, position: Position) {
        let mut state = self.state.lock();
        if let Some(rec) = state.clients.get_mut(client_id) {
            rec.position = position;
        }
        drop(state);
        self.broadcast_client_change();
        self.emit_spatial_snapshot();
    }

    pub fn set_listening_source(&self, position: Position) {
        self.state.lock().listening_source = position;
        self.emit_spatial_snapshot();
    }

    pub fn reorder_client(&self, client_id: &str, position: Position) {
        self.move_client(client_id, position);
    }

    // ── 4.5.6 Global volume ───────────────────────────────────────────────

    pub fn set_global_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        self.state.lock().global_volume = clamped;
        self.broadcast(ServerMessage::ScheduledAction {
            server_time_to_execute: now_ms(),
            scheduled_action: ScheduledAction::GlobalVolumeConfig {
                volume: clamped,
                ramp_time: crate::protocol_constants::GLOBAL_VOLUME_RAMP_TIME_SECS,
            },
        });
    }

    pub fn set_playback_controls(&self, permissions: PermissionMode) {
        self.state.lock().permissions = permissions;
        self.broadcast(ServerMessage::RoomEvent {
            event: RoomEvent::SetPlaybackControls { permissions },
        });
    }

    // ── 4.5.7 Chat ─────────────────────────────────────────────────────────

    pub fn send_chat_message(&self, client_id: &str, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let truncated: String = trimmed.chars().take(crate::protocol_constants::CHAT_MAX_MESSAGE_LENGTH).collect();

        let message = {
            let mut state = self.state.lock();
            let username = state
                .clients
                .get(client_id)
                .map(|rec| rec.username.clone())
                .unwrap_or_default();
            let country_code = state
                .clients
                .get(client_id)
                .and_then(|rec| rec.location.as_ref())
                .map(|loc| loc.country_code.clone());
            let id = state.next_chat_id;
            state.next_chat_id += 1;
            let message = ChatMessage {
                id,
                client_id: client_id.to_string(),
                username,
                text: truncated,
                timestamp: now_ms(),
                country_code,
            };
            state.chat.push_back(message.clone());
            while state.chat.len() > CHAT_HISTORY_CAPACITY {
                state.chat.pop_front();
            }
            message
        };

        self.broadcast(ServerMessage::RoomEvent {
            event: RoomEvent::ChatUpdate {
                messages: vec![message.clone()],
                is_full_sync: false,
                newest_id: message.id,
            },
        });
    }

    fn send_full_chat(&self, client_id: &str) {
        let (messages, newest_id) = {
            let state = self.state.lock();
            let messages: Vec<ChatMessage> = state.chat.iter().cloned().collect();
            let newest_id = messages.last().map(|m| m.id).unwrap_or(0);
            (messages, newest_id)
        };
        self.unicast(
            client_id,
            ServerMessage::RoomEvent {
                event: RoomEvent::ChatUpdate {
                    messages,
                    is_full_sync: true,
                    newest_id,
                },
            },
        );
    }

    // ── 4.5.8 Cleanup & backup hooks ───────────────────────────────────────

    pub fn create_backup(&self) -> RoomSnapshot {
        let state = self.state.lock();
        RoomSnapshot {
            client_datas: state
                .clients
                .iter()
                .map(|(id, rec)| to_client(id, rec))
                .collect(),
            audio_sources: state.queue.clone(),
            global_volume: state.global_volume,
            playback_state: Some(state.playback_state.clone()),
            chat: Some(crate::services::backup::ChatSnapshot {
                messages: state.chat.iter().cloned().collect(),
                next_message_id: state.next_chat_id,
            }),
        }
    }

    fn schedule_cleanup(self: &Arc<Self>) {
        let token = CancellationToken::new();
        *self.cleanup_task.lock() = Some(token.clone());
        let weak: Weak<Room> = Arc::downgrade(self);
        self.spawner.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(ROOM_CLEANUP_GRACE_SECS)) => {
                    if let Some(room) = weak.upgrade() {
                        room.cleanup().await;
                    }
                }
            }
        });
    }

    fn cancel_cleanup(&self) {
        if let Some(token) = self.cleanup_task.lock().take() {
            token.cancel();
        }
    }

    pub async fn cleanup(&self) {
        self.stop_heartbeat_sweeper();
        if let Some(token) = self.spatial_task.lock().take() {
            token.cancel();
        }
        self.cancel_load_barrier_timer();
        if let Err(e) = self.blob_store.delete_prefix(&format!("room-{}/", self.room_id)).await {
            log::warn!("[room {}] cleanup blob delete failed: {e}", self.room_id);
        }
        log::info!("[room {}] cleaned up", self.room_id);
        self.event_bridge.emit(RoomLifecycleEvent::Cleaned {
            room_id: self.room_id.clone(),
            timestamp: now_ms(),
        });
        if let Some(registry) = self.registry.upgrade() {
            registry.delete_room(&self.room_id);
        }
    }

    // ── Background timers ─────────────────────────────────────────────────

    fn start_heartbeat_sweeper(self: &Arc<Self>) {
        if self.heartbeat_task.lock().is_some() {
            return;
        }
        let token = CancellationToken::new();
        *self.heartbeat_task.lock() = Some(token.clone());
        let weak = Arc::downgrade(self);
        self.spawner.spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(HEARTBEAT_STEADY_INTERVAL_MS));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(room) = weak.upgrade() else { break };
                        room.sweep_stale_heartbeats();
                    }
                }
            }
        });
    }

    fn stop_heartbeat_sweeper(&self) {
        if let Some(token) = self.heartbeat_task.lock().take() {
            token.cancel();
        }
    }

    fn sweep_stale_heartbeats(self: &Arc<Self>) {
        let stale: Vec<String> = {
            let state = self.state.lock();
            let now = now_ms();
            state
                .connected
                .iter()
                .filter(|id| {
                    state
                        .clients
                        .get(*id)
                        .map(|rec| now.saturating_sub(rec.last_heartbeat_at) > HEARTBEAT_RESPONSE_TIMEOUT_MS)
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        };
        for client_id in stale {
            if let Some(session) = self.connected_sessions.lock().get(&client_id) {
                session.close(HEARTBEAT_TIMEOUT_CLOSE_CODE, HEARTBEAT_TIMEOUT_CLOSE_REASON);
            }
            self.remove_client(&client_id);
        }
    }

    fn start_load_barrier_timer(self: &Arc<Self>) {
        self.cancel_load_barrier_timer();
        let token = CancellationToken::new();
        *self.load_barrier_task.lock() = Some(token.clone());
        let deadline_ms = {
            let state = self.state.lock();
            state
                .pending_load_barrier
                .as_ref()
                .map(|b| b.deadline_ms)
                .unwrap_or(now_ms())
        };
        let wait = Duration::from_millis(deadline_ms.saturating_sub(now_ms()));
        let weak = Arc::downgrade(self);
        self.spawner.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(wait) => {
                    if let Some(room) = weak.upgrade() {
                        room.commit_play();
                    }
                }
            }
        });
    }

    fn cancel_load_barrier_timer(&self) {
        if let Some(token) = self.load_barrier_task.lock().take() {
            token.cancel();
        }
    }
}

fn current_track_position(state: &PlaybackState) -> f64 {
    match state {
        PlaybackState::Paused {
            track_position_seconds,
            ..
        } => *track_position_seconds,
        PlaybackState::Playing {
            server_time_to_execute,
            track_position_seconds,
            ..
        } => {
            let elapsed = (now_ms() as f64 - *server_time_to_execute as f64) / 1000.0;
            (track_position_seconds + elapsed).max(0.0)
        }
    }
}

fn pick_random(ids: &HashSet<String>) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let mut sorted: Vec<&String> = ids.iter().collect();
    sorted.sort();
    let idx = rand::random::<usize>() % sorted.len();
    Some(sorted[idx].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::TokioSpawner;
    use crate::services::storage::NoopBlobStore;
    use tokio::sync::mpsc;

    fn test_room() -> Arc<Room> {
        Room::new(
            "123456".to_string(),
            Arc::new(NoopBlobStore),
            Arc::new(TokioSpawner::current()),
            Arc::new(BroadcastEventBridge::new(8)),
            Weak::new(),
        )
    }

    fn session(client_id: &str, room_id: &str) -> (Session, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (close_tx, _close_rx) = mpsc::unbounded_channel();
        (
            Session::new(client_id.into(), client_id.into(), room_id.into(), tx, close_tx),
            rx,
        )
    }

    #[tokio::test]
    async fn first_client_to_join_becomes_admin() {
        let room = test_room();
        let (s1, _rx1) = session("c1", &room.room_id);
        room.add_client(s1, None);
        assert!(room.require_can_mutate("c1"));

        let clients = room.state.lock().connected_clients();
        assert!(clients.iter().find(|c| c.client_id == "c1").unwrap().is_admin);
    }

    #[tokio::test]
    async fn admin_promotion_on_leave() {
        let room = test_room();
        let (s1, _rx1) = session("c1", &room.room_id);
        let (s2, _rx2) = session("c2", &room.room_id);
        room.add_client(s1, None);
        room.add_client(s2, None);
        room.remove_client("c1");

        let state = room.state.lock();
        assert!(state.clients.get("c2").unwrap().is_admin);
    }

    #[tokio::test]
    async fn reconnect_restores_identity() {
        let room = test_room();
        let (s1, _rx1) = session("c1", &room.room_id);
        room.add_client(s1, None);
        room.set_admin("c1", true);
        room.remove_client("c1");

        let (s1b, _rx1b) = session("c1", &room.room_id);
        room.add_client(s1b, None);
        assert!(room.state.lock().clients.get("c1").unwrap().is_admin);
    }

    #[tokio::test]
    async fn play_for_unknown_track_is_dropped() {
        let room = test_room();
        let (s1, _rx1) = session("c1", &room.room_id);
        room.add_client(s1, None);
        room.clone().handle_play(
            "c1",
            PlayAction {
                audio_source: "missing".into(),
                track_position_seconds: 0.0,
            },
        );
        assert!(room.state.lock().pending_load_barrier.is_none());
    }

    #[tokio::test]
    async fn play_commits_once_all_connected_clients_load() {
        let room = test_room();
        let (s1, _rx1) = session("c1", &room.room_id);
        room.add_client(s1, None);
        room.set_audio_sources(vec!["u1".into()]);

        room.clone().handle_play(
            "c1",
            PlayAction {
                audio_source: "u1".into(),
                track_position_seconds: 0.0,
            },
        );
        assert!(room.state.lock().pending_load_barrier.is_some());

        room.clone().handle_audio_source_loaded("c1", "u1");
        assert!(room.state.lock().pending_load_barrier.is_none());
        assert!(room.state.lock().playback_state.is_playing());
    }

    #[tokio::test]
    async fn scheduled_execution_time_respects_min_bound() {
        let room = test_room();
        let (s1, _rx1) = session("c1", &room.room_id);
        room.add_client(s1, None);
        room.set_audio_sources(vec!["u1".into()]);
        let before = now_ms();
        room.clone().handle_play(
            "c1",
            PlayAction {
                audio_source: "u1".into(),
                track_position_seconds: 0.0,
            },
        );
        room.clone().handle_audio_source_loaded("c1", "u1");
        match room.state.lock().playback_state.clone() {
            PlaybackState::Playing {
                server_time_to_execute,
                ..
            } => {
                assert!(server_time_to_execute >= before + crate::protocol_constants::MIN_SCHEDULE_MS);
            }
            _ => panic!("expected playing"),
        }
    }

    #[tokio::test]
    async fn pause_clears_pending_barrier() {
        let room = test_room();
        let (s1, _rx1) = session("c1", &room.room_id);
        room.add_client(s1, None);
        room.set_audio_sources(vec!["u1".into()]);
        room.clone().handle_play(
            "c1",
            PlayAction {
                audio_source: "u1".into(),
                track_position_seconds: 0.0,
            },
        );
        room.handle_pause();
        assert!(room.state.lock().pending_load_barrier.is_none());
        assert!(!room.state.lock().playback_state.is_playing());
    }

    #[tokio::test]
    async fn removing_current_track_resets_to_paused_empty() {
        let room = test_room();
        room.set_audio_sources(vec!["u1".into()]);
        room.state.lock().playback_state = PlaybackState::Playing {
            audio_source: "u1".into(),
            server_time_to_execute: now_ms(),
            track_position_seconds: 0.0,
        };
        room.remove_audio_sources(&["u1".to_string()]);
        assert_eq!(room.state.lock().playback_state.audio_source(), "");
    }

    #[tokio::test]
    async fn chat_buffer_is_capped_and_ids_increase() {
        let room = test_room();
        let (s1, _rx1) = session("c1", &room.room_id);
        room.add_client(s1, None);
        for i in 0..(CHAT_HISTORY_CAPACITY + 10) {
            room.send_chat_message("c1", &format!("msg {i}"));
        }
        let state = room.state.lock();
        assert_eq!(state.chat.len(), CHAT_HISTORY_CAPACITY);
        assert_eq!(state.next_chat_id, (CHAT_HISTORY_CAPACITY + 11) as u64);
    }

    #[tokio::test]
    async fn empty_chat_message_is_rejected() {
        let room = test_room();
        let (s1, _rx1) = session("c1", &room.room_id);
        room.add_client(s1, None);
        room.send_chat_message("c1", "   ");
        assert!(room.state.lock().chat.is_empty());
    }

    #[tokio::test]
    async fn global_volume_is_clamped() {
        let room = test_room();
        room.set_global_volume(5.0);
        assert_eq!(room.state.lock().global_volume, 1.0);
        room.set_global_volume(-2.0);
        assert_eq!(room.state.lock().global_volume, 0.0);
    }

    #[tokio::test]
    async fn permission_everyone_allows_any_client_to_mutate() {
        let room = test_room();
        let (s1, _rx1) = session("c1", &room.room_id);
        room.add_client(s1, None);
        room.set_admin("c1", false);
        assert!(room.require_can_mutate("c1"));
    }

    #[tokio::test]
    async fn permission_admin_only_blocks_non_admin() {
        let room = test_room();
        let (s1, _rx1) = session("c1", &room.room_id);
        room.add_client(s1, None);
        room.set_admin("c1", false);
        room.set_playback_controls(PermissionMode::AdminOnly);
        assert!(!room.require_can_mutate("c1"));
    }
}
