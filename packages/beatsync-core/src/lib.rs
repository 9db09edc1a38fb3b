//! Beatsync Core - shared library for the Beatsync synchronized playback server.
//!
//! This crate provides the core functionality for Beatsync, a stateful
//! WebSocket server that coordinates synchronized multi-device audio
//! playback. It is designed to be used by the standalone server binary in
//! `apps/server`, but keeps every external collaborator (object storage,
//! music search/stream provider, snapshot persistence) behind a trait so it
//! can run fully in-memory for tests.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`runtime`]: Task spawning abstraction for async runtime independence
//! - [`scheduler`]: Clock and scheduled-execution-time math (C1)
//! - [`wire`]: The JSON wire codec (C3)
//! - [`session`]: Per-connection state (C4)
//! - [`services`]: The room state machine, registry, dispatcher, and collaborators (C5-C9)
//! - [`events`]: Internal lifecycle-event observability, distinct from the wire protocol
//! - [`config`]: Server configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines several traits to decouple core logic from platform-specific
//! or vendor-specific implementations:
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain lifecycle events
//! - [`BlobStore`](services::storage::BlobStore): Object storage for audio blobs
//! - [`MusicProvider`](services::provider::MusicProvider): Track search/stream resolution
//! - [`SnapshotStore`](services::backup::SnapshotStore): Room-state persistence
//!
//! Each trait has a default implementation suitable for running without any
//! external backend configured.

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod protocol_constants;
pub mod runtime;
pub mod scheduler;
pub mod services;
pub mod session;
pub mod wire;

// Re-export commonly used types at the crate root
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use config::Config;
pub use error::{BeatsyncError, BeatsyncResult};
pub use events::{BroadcastEventBridge, EventEmitter, RoomLifecycleEvent};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use services::{GlobalRegistry, MusicProvider, Room, SnapshotStore};
pub use session::Session;

// Re-export API types
pub use api::ws_connection::WsConnectionManager;
pub use api::{start_server, AppState, AppStateBuilder, ServerError};
