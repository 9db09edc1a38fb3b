//! Internal observability events — lifecycle notices, not wire frames.
//!
//! Distinct from [`crate::wire::RoomEvent`] (the client-facing `ROOM_EVENT`
//! payload): these are for logs/metrics/an optional admin feed, emitted
//! alongside the real broadcast, never in place of it.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

/// Lifecycle events a room or the registry may emit.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoomLifecycleEvent {
    Created { room_id: String, timestamp: u64 },
    Cleaned { room_id: String, timestamp: u64 },
    ClientJoined {
        room_id: String,
        client_id: String,
        timestamp: u64,
    },
    ClientLeft {
        room_id: String,
        client_id: String,
        timestamp: u64,
    },
    AdminPromoted {
        room_id: String,
        client_id: String,
        timestamp: u64,
    },
    Play {
        room_id: String,
        audio_source: String,
        timestamp: u64,
    },
    Pause {
        room_id: String,
        timestamp: u64,
    },
}
