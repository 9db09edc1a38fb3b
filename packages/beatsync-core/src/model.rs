//! Core data model shared by the wire codec and the room state machine (§3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A 2D position on the `[0, GRID_SIZE]²` grid (§3, I5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Coarse geolocation attached to a client, best-effort and optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientLocation {
    pub city: String,
    pub region: String,
    pub country: String,
    pub country_code: String,
    pub flag_svg_url: String,
}

/// A connected (or reconnectable) device in a room (§3 Client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub client_id: String,
    pub username: String,
    pub joined_at: u64,
    pub last_heartbeat_at: u64,
    pub rtt: u64,
    pub is_admin: bool,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<ClientLocation>,
}

/// Current room playback state (§3 PlaybackState). Tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackState {
    #[serde(rename_all = "camelCase")]
    Paused {
        audio_source: String,
        track_position_seconds: f64,
    },
    #[serde(rename_all = "camelCase")]
    Playing {
        audio_source: String,
        server_time_to_execute: u64,
        track_position_seconds: f64,
    },
}

impl PlaybackState {
    /// The initial state of a freshly created room: paused, no track, at zero.
    pub fn initial() -> Self {
        PlaybackState::Paused {
            audio_source: String::new(),
            track_position_seconds: 0.0,
        }
    }

    pub fn audio_source(&self) -> &str {
        match self {
            PlaybackState::Paused { audio_source, .. } => audio_source,
            PlaybackState::Playing { audio_source, .. } => audio_source,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { .. })
    }
}

/// A play request carried by `ClientMessage::Play` and staged in a load barrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayAction {
    pub audio_source: String,
    #[serde(default)]
    pub track_position_seconds: f64,
}

/// The waiting phase between a `PLAY` request and its broadcast (§4.5.2).
#[derive(Debug, Clone)]
pub struct PendingLoadBarrier {
    pub play_action: PlayAction,
    pub initiator_id: String,
    pub loaded_set: std::collections::HashSet<String>,
    pub deadline_ms: u64,
}

/// Per-client gain and ramp time emitted while the spatial loop runs (§3 SpatialConfig).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GainEntry {
    pub gain: f32,
    pub ramp_time: f64,
}

/// A transient snapshot of the spatial mix, recomputed every tick or on
/// any geometry-affecting event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialConfig {
    pub listening_source: Position,
    pub gains: HashMap<String, GainEntry>,
}

/// A chat message in a room's rolling history (§3 ChatMessage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: u64,
    pub client_id: String,
    pub username: String,
    pub text: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

/// Room mutation permission mode (§3 Room, `permissions`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionMode {
    Everyone,
    AdminOnly,
}

impl Default for PermissionMode {
    fn default() -> Self {
        PermissionMode::Everyone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_playback_state_is_paused_empty_zero() {
        let state = PlaybackState::initial();
        assert!(!state.is_playing());
        assert_eq!(state.audio_source(), "");
        match state {
            PlaybackState::Paused {
                track_position_seconds,
                ..
            } => assert_eq!(track_position_seconds, 0.0),
            _ => panic!("expected paused"),
        }
    }

    #[test]
    fn playback_state_serializes_tagged() {
        let state = PlaybackState::Playing {
            audio_source: "u1".into(),
            server_time_to_execute: 1234,
            track_position_seconds: 1.5,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["type"], "playing");
        assert_eq!(json["audioSource"], "u1");
    }
}
