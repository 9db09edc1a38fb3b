//! HTTP route handlers (C10).
//!
//! All handlers are thin - they delegate to services for business logic.
//! JSON responses carry permissive CORS headers so any origin can reach a
//! Beatsync server directly from the browser.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::BeatsyncError;
use crate::protocol_constants::{APP_NAME, SERVICE_ID};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/stats", get(stats))
        .route("/discover", get(discover))
        .route("/active-rooms", get(active_rooms))
        .route("/default", get(default_tracks))
        .route("/upload/get-presigned-url", post(get_presigned_url))
        .route("/upload/complete", post(upload_complete))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe: "Is the process running?"
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "name": APP_NAME,
    }))
}

/// Process- and room-level counters.
async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let rooms = state.registry.rooms();
    let room_count = rooms.len();
    let active_room_count = state.registry.active_room_ids().len();
    let connection_count = state.ws_manager.connection_count();

    Json(json!({
        "rooms": room_count,
        "activeRooms": active_room_count,
        "connections": connection_count,
    }))
}

/// Active rooms (≥1 connected client), for discovery UIs.
async fn discover(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "rooms": state.registry.active_room_ids() }))
}

/// Just the count, for callers that only need a liveness signal per room.
async fn active_rooms(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "count": state.registry.active_room_ids().len() }))
}

/// Default track list a freshly created room can be seeded with, sourced
/// from the music provider's catalog via an empty-query search.
async fn default_tracks(State(state): State<AppState>) -> Response {
    match state.music_provider.search("").await {
        Ok(results) => Json(json!({ "tracks": results })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignedUrlRequest {
    room_id: String,
    filename: String,
}

/// Mints a presigned upload URL scoped to the room's blob prefix so cleanup
/// (`deleteAudioSources`, room cleanup) can later recognize and remove it.
async fn get_presigned_url(
    State(state): State<AppState>,
    Json(req): Json<PresignedUrlRequest>,
) -> Response {
    if req.room_id.trim().is_empty() || req.filename.trim().is_empty() {
        return BeatsyncError::InvalidRequest("roomId and filename are required".into())
            .into_response();
    }

    let key = format!("room-{}/{}", req.room_id, req.filename);
    match state.blob_store.presign_upload(&key).await {
        Ok(url) => Json(json!({ "url": url, "key": key })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadCompleteRequest {
    room_id: String,
    urls: Vec<String>,
}

/// Finalizes an upload: the room's queue is replaced with `urls` and a
/// `SET_AUDIO_SOURCES` broadcast goes out to every connected client.
async fn upload_complete(
    State(state): State<AppState>,
    Json(req): Json<UploadCompleteRequest>,
) -> Response {
    if req.room_id.trim().is_empty() {
        return BeatsyncError::InvalidRequest("roomId is required".into()).into_response();
    }

    let room = state.registry.get_or_create_room(&req.room_id);
    room.set_audio_sources(req.urls);
    StatusCode::NO_CONTENT.into_response()
}
