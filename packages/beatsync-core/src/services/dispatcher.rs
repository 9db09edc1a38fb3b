//! Pure routing table from an inbound frame to a room handler (C7).
//!
//! Validation failures (C3) have already been turned into the standard
//! `ERROR` frame by the time a message reaches here — everything this module
//! sees is a syntactically valid `ClientMessage`. From here on, handler
//! errors are logged and swallowed; the socket stays open (spec.md §7).

use std::sync::Arc;

use crate::model::{PlayAction, Position};
use crate::services::room::Room;
use crate::services::provider::MusicProvider;
use crate::wire::{ClientMessage, ServerMessage};

/// Messages that mutate room state require either admin privilege or
/// `EVERYONE` permissions. Read-only/self-describing messages (NTP, SYNC,
/// search) bypass the gate.
fn requires_mutation_authority(message: &ClientMessage) -> bool {
    !matches!(
        message,
        ClientMessage::NtpRequest { .. }
            | ClientMessage::Sync
            | ClientMessage::SendIp { .. }
            | ClientMessage::AudioSourceLoaded { .. }
            | ClientMessage::SearchMusic { .. }
            | ClientMessage::StreamMusic { .. }
            | ClientMessage::SendChatMessage { .. }
    )
}

/// Dispatches one inbound frame to the room that owns `client_id`.
///
/// NTP handling and the raw `t1` stamp happen one layer up (C2, in the WS
/// handler) since they need the socket-level receive instant; this function
/// only covers the room-mutating / room-reading half of the protocol.
pub async fn dispatch(
    room: &Arc<Room>,
    music_provider: &Arc<dyn MusicProvider>,
    client_id: &str,
    message: ClientMessage,
) {
    if requires_mutation_authority(&message) && !room.require_can_mutate(client_id) {
        log::warn!("[dispatcher] {client_id} denied mutation in room {}", room.room_id);
        return;
    }

    match message {
        ClientMessage::NtpRequest { .. } => {
            // Handled by the WS layer before dispatch; nothing to do here.
        }
        ClientMessage::Play {
            audio_source,
            track_position_seconds,
        } => {
            room.handle_play(
                client_id,
                PlayAction {
                    audio_source,
                    track_position_seconds,
                },
            );
        }
        ClientMessage::Pause => room.handle_pause(),
        ClientMessage::Sync => room.handle_sync(client_id),
        ClientMessage::StartSpatialAudio => room.start_spatial_audio(),
        ClientMessage::StopSpatialAudio => room.stop_spatial_audio(),
        ClientMessage::ReorderClient { client_id: target, position } => {
            if is_on_grid(position) {
                room.reorder_client(&target, position);
            } else {
                room.send_error(client_id, "position out of grid bounds");
            }
        }
        ClientMessage::SetListeningSource { position } => {
            if is_on_grid(position) {
                room.set_listening_source(position);
            } else {
                room.send_error(client_id, "position out of grid bounds");
            }
        }
        ClientMessage::MoveClient { position } => {
            if is_on_grid(position) {
                room.move_client(client_id, position);
            } else {
                room.send_error(client_id, "position out of grid bounds");
            }
        }
        ClientMessage::SetAdmin { client_id: target, is_admin } => room.set_admin(&target, is_admin),
        ClientMessage::SetPlaybackControls { permissions } => room.set_playback_controls(permissions),
        ClientMessage::SetGlobalVolume { volume } => room.set_global_volume(volume),
        ClientMessage::SendChatMessage { text } => room.send_chat_message(client_id, &text),
        ClientMessage::SendIp { ip } => {
            log::debug!("[dispatcher] {client_id} reported ip {ip}");
        }
        ClientMessage::AudioSourceLoaded { url } => {
            room.handle_audio_source_loaded(client_id, &url);
        }
        ClientMessage::LoadDefaultTracks => {
            log::info!("[dispatcher] {client_id} requested default tracks in room {}", room.room_id);
            match music_provider.search("").await {
                Ok(results) => {
                    let mut urls = Vec::with_capacity(results.len());
                    for track in &results {
                        match music_provider.stream_url(&track.track_id).await {
                            Ok(url) => urls.push(url),
                            Err(e) => log::warn!(
                                "[dispatcher] stream_url failed for default track {}: {e}",
                                track.track_id
                            ),
                        }
                    }
                    room.set_audio_sources(urls);
                }
                Err(e) => {
                    log::warn!("[dispatcher] default tracks search failed: {e}");
                    room.send_error(client_id, "failed to load default tracks");
                }
            }
        }
        ClientMessage::DeleteAudioSources { urls } => {
            if let Err(e) = room.delete_audio_sources(urls).await {
                log::warn!("[dispatcher] delete_audio_sources failed: {e}");
            }
        }
        ClientMessage::SearchMusic { query } => match music_provider.search(&query).await {
            Ok(results) => {
                log::debug!("[dispatcher] search '{query}' returned {} results", results.len());
                room.send_to_client(client_id, ServerMessage::SearchResults { results });
            }
            Err(e) => {
                log::warn!("[dispatcher] search failed: {e}");
                room.send_error(client_id, "search failed");
            }
        },
        ClientMessage::StreamMusic { track_id } => match music_provider.stream_url(&track_id).await {
            Ok(url) => {
                log::debug!("[dispatcher] resolved stream url for {track_id}: {url}");
                room.send_to_client(client_id, ServerMessage::StreamUrl { track_id, url });
            }
            Err(e) => {
                log::warn!("[dispatcher] stream_url failed: {e}");
                room.send_error(client_id, "stream resolution failed");
            }
        },
    }
}

/// Reposition helper kept at module scope so other entry points (HTTP queue
/// endpoints) can validate a position the same way the dispatcher would.
pub fn is_on_grid(position: Position) -> bool {
    (0.0..=crate::protocol_constants::GRID_SIZE).contains(&position.x)
        && (0.0..=crate::protocol_constants::GRID_SIZE).contains(&position.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastEventBridge;
    use crate::runtime::TokioSpawner;
    use crate::services::provider::test_support::MockMusicProvider;
    use crate::services::storage::NoopBlobStore;
    use std::sync::atomic::Ordering;
    use std::sync::Weak;

    #[test]
    fn read_only_messages_bypass_mutation_gate() {
        assert!(!requires_mutation_authority(&ClientMessage::Sync));
        assert!(!requires_mutation_authority(&ClientMessage::NtpRequest { t0: 0, rtt: None }));
    }

    #[test]
    fn mutating_messages_require_authority() {
        assert!(requires_mutation_authority(&ClientMessage::Pause));
        assert!(requires_mutation_authority(&ClientMessage::SetGlobalVolume { volume: 0.5 }));
    }

    #[test]
    fn grid_bounds_are_inclusive() {
        assert!(is_on_grid(Position { x: 0.0, y: 100.0 }));
        assert!(!is_on_grid(Position { x: -0.1, y: 0.0 }));
        assert!(!is_on_grid(Position { x: 0.0, y: 100.1 }));
    }

    fn test_room() -> Arc<Room> {
        Room::new(
            "123456".to_string(),
            Arc::new(NoopBlobStore),
            Arc::new(TokioSpawner::current()),
            Arc::new(BroadcastEventBridge::new(8)),
            Weak::new(),
        )
    }

    #[tokio::test]
    async fn move_client_out_of_grid_is_rejected() {
        let room = test_room();
        let provider: Arc<dyn MusicProvider> = Arc::new(MockMusicProvider::default());
        dispatch(
            &room,
            &provider,
            "alice",
            ClientMessage::MoveClient {
                position: Position {
                    x: -1.0,
                    y: 0.0,
                },
            },
        )
        .await;
        // Out-of-grid positions never reach `room.move_client`; nothing to
        // observe beyond "no panic and no mutation", since the client isn't
        // even connected yet.
    }

    #[tokio::test]
    async fn load_default_tracks_populates_audio_sources() {
        let room = test_room();
        let provider: Arc<dyn MusicProvider> = Arc::new(MockMusicProvider::default());
        dispatch(&room, &provider, "alice", ClientMessage::LoadDefaultTracks).await;
        let backup = room.create_backup();
        assert_eq!(backup.audio_sources, vec!["https://mock.invalid/stream/t1".to_string()]);
    }

    #[tokio::test]
    async fn search_music_queries_provider() {
        let room = test_room();
        let mock = Arc::new(MockMusicProvider::default());
        let provider: Arc<dyn MusicProvider> = mock.clone();
        dispatch(
            &room,
            &provider,
            "alice",
            ClientMessage::SearchMusic {
                query: "synthwave".to_string(),
            },
        )
        .await;
        assert_eq!(mock.search_calls.load(Ordering::SeqCst), 1);
    }
}
