//! Wire codec: the JSON tagged-union message contract (C3, spec.md §4.3).
//!
//! Mirrors the shape of this stack's existing WebSocket frame enums: a
//! `type`-discriminated enum per direction, `SCREAMING_SNAKE_CASE` variant
//! names, `camelCase` fields, and a `to_message()` helper that serializes an
//! outbound frame straight into an `axum::extract::ws::Message::Text`.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::model::{ChatMessage, GainEntry, PlaybackState, Position};
use crate::services::provider::TrackResult;

/// Inbound request set — the closed enum a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    NtpRequest {
        t0: u64,
        /// Client's self-computed rtt from a prior round, reported
        /// periodically so the server can keep its own smoothed estimate
        /// current for scheduling (spec.md §4.2). Absent on the first
        /// handshake frames.
        #[serde(default)]
        rtt: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Play {
        audio_source: String,
        #[serde(default)]
        track_position_seconds: f64,
    },
    Pause,
    Sync,
    StartSpatialAudio,
    StopSpatialAudio,
    #[serde(rename_all = "camelCase")]
    ReorderClient {
        client_id: String,
        position: Position,
    },
    #[serde(rename_all = "camelCase")]
    SetListeningSource {
        position: Position,
    },
    #[serde(rename_all = "camelCase")]
    MoveClient {
        position: Position,
    },
    #[serde(rename_all = "camelCase")]
    SetAdmin {
        client_id: String,
        is_admin: bool,
    },
    #[serde(rename_all = "camelCase")]
    SetPlaybackControls {
        permissions: crate::model::PermissionMode,
    },
    #[serde(rename_all = "camelCase")]
    SetGlobalVolume {
        volume: f32,
    },
    #[serde(rename_all = "camelCase")]
    SendChatMessage {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    SendIp {
        ip: String,
    },
    #[serde(rename_all = "camelCase")]
    AudioSourceLoaded {
        url: String,
    },
    LoadDefaultTracks,
    #[serde(rename_all = "camelCase")]
    DeleteAudioSources {
        urls: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    SearchMusic {
        query: String,
    },
    #[serde(rename_all = "camelCase")]
    StreamMusic {
        track_id: String,
    },
}

/// The action carried by an outbound `SCHEDULED_ACTION` frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduledAction {
    #[serde(rename_all = "camelCase")]
    Play {
        audio_source: String,
        track_time_seconds: f64,
    },
    Pause,
    #[serde(rename_all = "camelCase")]
    SpatialConfig {
        listening_source: Position,
        gains: std::collections::HashMap<String, GainEntry>,
        ramp_time: f64,
    },
    StopSpatialAudio,
    #[serde(rename_all = "camelCase")]
    GlobalVolumeConfig { volume: f32, ramp_time: f64 },
}

/// The event carried by an outbound `ROOM_EVENT` frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomEvent {
    #[serde(rename_all = "camelCase")]
    ClientChange {
        clients: Vec<crate::model::Client>,
    },
    #[serde(rename_all = "camelCase")]
    SetAudioSources {
        sources: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    SetPlaybackControls {
        permissions: crate::model::PermissionMode,
    },
    #[serde(rename_all = "camelCase")]
    ChatUpdate {
        messages: Vec<ChatMessage>,
        is_full_sync: bool,
        newest_id: u64,
    },
    #[serde(rename_all = "camelCase")]
    LoadAudioSource {
        audio_source_to_play: String,
    },
}

/// Outbound broadcast/unicast set — everything the server may send.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ScheduledAction {
        server_time_to_execute: u64,
        scheduled_action: ScheduledAction,
    },
    #[serde(rename_all = "camelCase")]
    RoomEvent { event: RoomEvent },
    #[serde(rename_all = "camelCase")]
    StreamJobUpdate { active_job_count: u32 },
    /// Unicast reply to a `SEARCH_MUSIC` request.
    #[serde(rename_all = "camelCase")]
    SearchResults { results: Vec<TrackResult> },
    /// Unicast reply to a `STREAM_MUSIC` request.
    #[serde(rename_all = "camelCase")]
    StreamUrl { track_id: String, url: String },
    /// `{t0, t1, t2}` NTP reply (C2).
    NtpResponse {
        t0: u64,
        t1: u64,
        t2: u64,
    },
    /// Validation failure: the frame is dropped, the session stays open.
    Error {
        message: String,
    },
    /// Full room state sent on connect and whenever a client needs a full resync.
    #[serde(rename_all = "camelCase")]
    InitialState {
        clients: Vec<crate::model::Client>,
        audio_sources: Vec<String>,
        playback_state: PlaybackState,
        global_volume: f32,
    },
}

impl ServerMessage {
    /// Serializes to a text WebSocket frame, or `None` if serialization
    /// somehow fails (never expected for these plain-data enums).
    pub fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self).ok().map(Message::Text)
    }

    /// Convenience constructor for the standard validation-error frame.
    pub fn invalid_format() -> Self {
        ServerMessage::Error {
            message: "Invalid message format".to_string(),
        }
    }

    /// Builds an `ERROR` frame carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ntp_request() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"NTP_REQUEST","t0":12345}"#).unwrap();
        match msg {
            ClientMessage::NtpRequest { t0, rtt } => {
                assert_eq!(t0, 12345);
                assert_eq!(rtt, None);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn decodes_ntp_request_with_reported_rtt() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"NTP_REQUEST","t0":12345,"rtt":42}"#).unwrap();
        match msg {
            ClientMessage::NtpRequest { rtt, .. } => assert_eq!(rtt, Some(42)),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn decodes_play_with_default_position() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"PLAY","audioSource":"u1"}"#).unwrap();
        match msg {
            ClientMessage::Play {
                audio_source,
                track_position_seconds,
            } => {
                assert_eq!(audio_source, "u1");
                assert_eq!(track_position_seconds, 0.0);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_discriminant_fails_to_decode() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"NOT_A_REAL_TYPE"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn error_frame_serializes_with_standard_message() {
        let frame = ServerMessage::invalid_format();
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "ERROR");
        assert_eq!(json["message"], "Invalid message format");
    }

    #[test]
    fn error_frame_carries_custom_message() {
        let frame = ServerMessage::error("position out of grid bounds");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "ERROR");
        assert_eq!(json["message"], "position out of grid bounds");
    }

    #[test]
    fn stream_url_frame_serializes_with_camel_case_fields() {
        let frame = ServerMessage::StreamUrl {
            track_id: "t1".into(),
            url: "https://example.invalid/t1".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "STREAM_URL");
        assert_eq!(json["trackId"], "t1");
    }

    #[test]
    fn scheduled_action_play_round_trips_through_json() {
        let frame = ServerMessage::ScheduledAction {
            server_time_to_execute: 1000,
            scheduled_action: ScheduledAction::Play {
                audio_source: "u1".into(),
                track_time_seconds: 3.5,
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "SCHEDULED_ACTION");
        assert_eq!(json["scheduledAction"]["type"], "PLAY");
        assert_eq!(json["scheduledAction"]["audioSource"], "u1");
    }
}
