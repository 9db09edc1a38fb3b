//! Centralized error types for the Beatsync core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses
//!
//! WebSocket-level validation errors (malformed frames, out-of-range values)
//! do not go through this type — they become `ServerMessage::Error` frames
//! directly, since the socket must stay open. This type is for the HTTP
//! surface and for fatal startup failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type for the Beatsync server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum BeatsyncError {
    /// Room id doesn't match the 6-digit numeric format, or the room doesn't exist.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Referenced audio source isn't in the room's queue.
    #[error("Audio source not found: {0}")]
    AudioSourceNotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Caller isn't allowed to mutate this room's state.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// The blob store collaborator failed (presign, delete).
    #[error("Storage error: {0}")]
    Storage(String),

    /// The music search/stream provider adapter failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Backup snapshot read/write failed.
    #[error("Backup error: {0}")]
    Backup(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error (missing or invalid required settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BeatsyncError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) => "room_not_found",
            Self::AudioSourceNotFound(_) => "audio_source_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotAuthorized(_) => "not_authorized",
            Self::Storage(_) => "storage_error",
            Self::Provider(_) => "provider_error",
            Self::Backup(_) => "backup_error",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RoomNotFound(_) | Self::AudioSourceNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotAuthorized(_) => StatusCode::FORBIDDEN,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type BeatsyncResult<T> = Result<T, BeatsyncError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for BeatsyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_not_found_returns_correct_code() {
        let err = BeatsyncError::RoomNotFound("123456".into());
        assert_eq!(err.code(), "room_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn not_authorized_returns_forbidden() {
        let err = BeatsyncError::NotAuthorized("requires admin".into());
        assert_eq!(err.code(), "not_authorized");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn configuration_error_returns_service_unavailable() {
        let err = BeatsyncError::Configuration("missing PROVIDER_URL".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
