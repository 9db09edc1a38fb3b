//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to services.
//! It provides the router construction and server startup functionality.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::config::Config;
use crate::events::BroadcastEventBridge;
use crate::services::backup::SnapshotStore;
use crate::services::provider::MusicProvider;
use crate::services::registry::GlobalRegistry;
use crate::services::storage::BlobStore;

pub mod http;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the configured address.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Rooms live here, keyed by roomId.
    pub registry: Arc<GlobalRegistry>,
    /// Mints upload URLs for the object-storage collaborator.
    pub blob_store: Arc<dyn BlobStore>,
    /// Resolves track search/stream lookups.
    pub music_provider: Arc<dyn MusicProvider>,
    /// Persists and restores room snapshots.
    pub snapshot_store: Arc<dyn SnapshotStore>,
    /// Event bridge for emitting room lifecycle events to an admin/metrics feed.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Application configuration.
    pub config: Arc<Config>,
    /// Whether background services have been started.
    services_started: Arc<AtomicBool>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    registry: Option<Arc<GlobalRegistry>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    music_provider: Option<Arc<dyn MusicProvider>>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    event_bridge: Option<Arc<BroadcastEventBridge>>,
    ws_manager: Option<Arc<WsConnectionManager>>,
    config: Option<Arc<Config>>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates every field this builder can derive from a bootstrapped
    /// service container in one call, leaving nothing to set individually.
    pub fn from_services(mut self, services: &crate::BootstrappedServices) -> Self {
        self.registry = Some(Arc::clone(&services.registry));
        self.blob_store = Some(Arc::clone(&services.blob_store));
        self.music_provider = Some(Arc::clone(&services.music_provider));
        self.snapshot_store = Some(Arc::clone(&services.snapshot_store));
        self.event_bridge = Some(Arc::clone(&services.event_bridge));
        self.ws_manager = Some(Arc::clone(&services.ws_manager));
        self.config = Some(Arc::clone(&services.config));
        self
    }

    /// Sets the global registry.
    pub fn registry(mut self, registry: Arc<GlobalRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the blob store.
    pub fn blob_store(mut self, blob_store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(blob_store);
        self
    }

    /// Sets the music provider.
    pub fn music_provider(mut self, music_provider: Arc<dyn MusicProvider>) -> Self {
        self.music_provider = Some(music_provider);
        self
    }

    /// Sets the snapshot store.
    pub fn snapshot_store(mut self, snapshot_store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(snapshot_store);
        self
    }

    /// Sets the event bridge.
    pub fn event_bridge(mut self, bridge: Arc<BroadcastEventBridge>) -> Self {
        self.event_bridge = Some(bridge);
        self
    }

    /// Sets the WebSocket connection manager.
    pub fn ws_manager(mut self, manager: Arc<WsConnectionManager>) -> Self {
        self.ws_manager = Some(manager);
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`, panicking if required fields are missing.
    pub fn build(self) -> AppState {
        AppState {
            registry: self.registry.expect("registry is required"),
            blob_store: self.blob_store.expect("blob_store is required"),
            music_provider: self.music_provider.expect("music_provider is required"),
            snapshot_store: self.snapshot_store.expect("snapshot_store is required"),
            event_bridge: self.event_bridge.expect("event_bridge is required"),
            ws_manager: self.ws_manager.expect("ws_manager is required"),
            config: self.config.expect("config is required"),
            services_started: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Marks services as started.
    ///
    /// Returns `true` if this was the first call to mark started,
    /// `false` if already started.
    pub fn mark_services_started(&self) -> bool {
        self.services_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Returns whether services have been started.
    pub fn services_started(&self) -> bool {
        self.services_started.load(Ordering::SeqCst)
    }
}

/// Starts the HTTP server bound to `config.bind_host:bind_port`.
///
/// Unlike a desktop app juggling an ephemeral LAN port, a server deployment's
/// address is part of its own configuration, so there's no port-scanning
/// fallback here: a single configured bind address, or an error.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let addr = SocketAddr::from((
        state
            .config
            .bind_host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        state.config.bind_port,
    ));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!(
        "[{}] listening on http://{}",
        crate::protocol_constants::APP_NAME,
        addr
    );

    let app = http::create_router(state);

    // Use into_make_service_with_connect_info to enable ConnectInfo<SocketAddr> extraction.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
