//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the wire contract (scheduling envelopes, NTP
//! pacing, spatial geometry) and changing them would desync already-connected
//! clients running against an older constant set.

// ─────────────────────────────────────────────────────────────────────────────
// Clock & Scheduler (C1)
// ─────────────────────────────────────────────────────────────────────────────

/// Floor for `scheduledExecutionTime` (ms from now).
pub const MIN_SCHEDULE_MS: u64 = 400;

/// Ceiling for `scheduledExecutionTime` (ms from now), regardless of RTT.
pub const CAP_SCHEDULE_MS: u64 = 3000;

/// RTT assumed for a client that hasn't reported one yet.
pub const DEFAULT_RTT_MS: u64 = 0;

/// Multiplier applied to the worst observed RTT when computing schedule lead time.
pub const SCHEDULE_RTT_MULTIPLIER: f64 = 1.5;

/// Fixed buffer added on top of the RTT term to absorb handler/processing lag (ms).
pub const SCHEDULE_PROCESSING_BUFFER_MS: u64 = 200;

/// Extra lead time given to a late joiner's `SYNC` response (ms), on top of the
/// normal schedule window, so the client has time to decode before the instant.
pub const SYNC_EXTRA_MS: u64 = 1500;

// ─────────────────────────────────────────────────────────────────────────────
// NTP Responder / Heartbeat (C2)
// ─────────────────────────────────────────────────────────────────────────────

/// EMA smoothing factor applied to each new RTT sample.
pub const RTT_SMOOTHING_ALPHA: f64 = 0.2;

/// A session is disconnected once `now - lastHeartbeatAt` exceeds this (ms).
pub const HEARTBEAT_RESPONSE_TIMEOUT_MS: u64 = 10_000;

/// Interval at which the heartbeat sweeper checks every connected session (ms).
pub const HEARTBEAT_STEADY_INTERVAL_MS: u64 = 1_000;

/// Close code sent when a session is evicted for heartbeat timeout.
pub const HEARTBEAT_TIMEOUT_CLOSE_CODE: u16 = 1000;
pub const HEARTBEAT_TIMEOUT_CLOSE_REASON: &str = "Connection timeout";

// ─────────────────────────────────────────────────────────────────────────────
// Load barrier (§4.5.2)
// ─────────────────────────────────────────────────────────────────────────────

/// How long a pending load barrier waits for `AUDIO_SOURCE_LOADED` before
/// committing with whatever clients have confirmed (ms).
pub const LOAD_BARRIER_DEADLINE_MS: u64 = 3000;

// ─────────────────────────────────────────────────────────────────────────────
// Spatial grid & engine (C8)
// ─────────────────────────────────────────────────────────────────────────────

/// Side length of the square position grid clients live on.
pub const GRID_SIZE: f64 = 100.0;

/// Origin used when positioning the first client and the listening source.
pub const GRID_ORIGIN_X: f64 = 50.0;
pub const GRID_ORIGIN_Y: f64 = 50.0;

/// Radius of the circle newly-joined clients (N > 1) are arranged on.
pub const CLIENT_CIRCLE_RADIUS: f64 = 25.0;

/// Radius of the slow circle the listening source drifts along while the
/// spatial loop is running.
pub const LISTENING_SOURCE_CIRCLE_RADIUS: f64 = 25.0;

/// Gain floor: the quietest a connected client is ever told to play at.
pub const AUDIO_GAIN_LOW: f32 = 0.15;

/// Gain ceiling, applied at or below the "near" radius.
pub const AUDIO_GAIN_HIGH: f32 = 1.0;

/// Distance at/below which a client gets full gain.
pub const SPATIAL_NEAR_RADIUS: f64 = 10.0;

/// Distance at/above which a client is clamped to the gain floor.
pub const SPATIAL_FAR_RADIUS: f64 = 60.0;

/// Spatial tick interval (ms). Runs at 10 Hz while the spatial loop is active.
pub const SPATIAL_TICK_INTERVAL_MS: u64 = 100;

/// Ramp time clients should use when applying a per-tick `SPATIAL_CONFIG` (seconds).
pub const SPATIAL_RAMP_TIME_SECS: f64 = 0.25;

/// Ramp time clients should use when applying a `GLOBAL_VOLUME_CONFIG` (seconds).
pub const GLOBAL_VOLUME_RAMP_TIME_SECS: f64 = 0.1;

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

/// Rolling chat buffer capacity per room; oldest messages are evicted past this.
pub const CHAT_HISTORY_CAPACITY: usize = 300;

/// Maximum chat message length in UTF-8 bytes.
pub const CHAT_MAX_MESSAGE_LENGTH: usize = 500;

// ─────────────────────────────────────────────────────────────────────────────
// Room lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Grace period after the last client disconnects before a room is cleaned up (seconds).
pub const ROOM_CLEANUP_GRACE_SECS: u64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Application identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in logs and the healthcheck response.
pub const APP_NAME: &str = "Beatsync";

/// Service identifier returned by the healthcheck endpoint.
pub const SERVICE_ID: &str = "beatsync";

// ─────────────────────────────────────────────────────────────────────────────
// Server-side channel/backup tuning
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the per-room broadcast channel.
pub const ROOM_BROADCAST_CHANNEL_CAPACITY: usize = 256;

/// Minimum interval between periodic backup snapshots (seconds). Spec requires ≥ 1/min.
pub const BACKUP_SNAPSHOT_INTERVAL_SECS: u64 = 60;

/// Capacity of the internal room lifecycle event bridge channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default port the server binds when not overridden by config/env.
pub const DEFAULT_BIND_PORT: u16 = 8080;
