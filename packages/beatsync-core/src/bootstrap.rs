//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::api::ws_connection::WsConnectionManager;
use crate::config::Config;
use crate::error::{BeatsyncError, BeatsyncResult};
use crate::events::BroadcastEventBridge;
use crate::protocol_constants::EVENT_CHANNEL_CAPACITY;
use crate::runtime::TokioSpawner;
use crate::services::backup::{FileSnapshotStore, Snapshot, SnapshotStore};
use crate::services::provider::{HttpMusicProvider, MusicProvider};
use crate::services::registry::GlobalRegistry;
use crate::services::storage::{BlobStore, NoopBlobStore};

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap.
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Rooms live here, keyed by roomId.
    pub registry: Arc<GlobalRegistry>,
    /// Mints upload URLs and deletes blobs on room cleanup.
    pub blob_store: Arc<dyn BlobStore>,
    /// Resolves track search/stream lookups against the configured provider.
    pub music_provider: Arc<dyn MusicProvider>,
    /// Persists and restores room snapshots to disk.
    pub snapshot_store: Arc<dyn SnapshotStore>,
    /// Event bridge for emitting room lifecycle events to an admin/metrics feed.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Shared HTTP client for connection pooling.
    http_client: Client,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    /// Server configuration this instance was bootstrapped with.
    pub config: Arc<Config>,
}

impl BootstrappedServices {
    /// Returns the shared HTTP client.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Initiates graceful shutdown: cancels background tasks, closes every
    /// open WebSocket, and writes a final snapshot so no state is lost.
    pub async fn shutdown(&self) {
        log::info!("[bootstrap] beginning graceful shutdown");

        self.cancel_token.cancel();

        let connections_closed = self.ws_manager.close_all();
        if connections_closed > 0 {
            log::info!("[bootstrap] closed {connections_closed} websocket connection(s)");
        }

        let snapshot = Snapshot {
            timestamp: crate::scheduler::now_ms(),
            data: self.registry.create_backup(),
        };
        if let Err(e) = self.snapshot_store.save(&snapshot) {
            log::error!("[bootstrap] final snapshot save failed: {e}");
        }

        log::info!("[bootstrap] shutdown complete");
    }

    /// Spawns the periodic snapshot task. Runs until `cancel_token` fires.
    pub fn start_backup_task(&self) {
        let registry = Arc::clone(&self.registry);
        let snapshot_store = Arc::clone(&self.snapshot_store);
        let cancel_token = self.cancel_token.clone();
        let interval_secs = self.config.backup_interval_secs;

        self.spawner.spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let snapshot = Snapshot {
                            timestamp: crate::scheduler::now_ms(),
                            data: registry.create_backup(),
                        };
                        if let Err(e) = snapshot_store.save(&snapshot) {
                            log::warn!("[bootstrap] periodic snapshot save failed: {e}");
                        }
                    }
                }
            }
        });
    }
}

fn create_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client")
}

/// Bootstraps all application services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together. The wiring order matters:
///
/// 1. Shared infrastructure (HTTP client, cancellation token, task spawner)
/// 2. Snapshot store (depends on config's data dir)
/// 3. Event bridge (rooms need it before the registry can hand any out)
/// 4. Global registry, restored from the persisted snapshot if one exists
/// 5. Music provider (depends on HTTP client, config's provider URL)
/// 6. WebSocket connection manager
///
/// # Errors
///
/// Returns an error if the data directory can't be created or an existing
/// snapshot file can't be parsed.
pub fn bootstrap_services(config: &Config) -> BeatsyncResult<BootstrappedServices> {
    config.validate().map_err(BeatsyncError::Configuration)?;

    let spawner = TokioSpawner::current();
    let http_client = create_http_client();
    let cancel_token = CancellationToken::new();

    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| BeatsyncError::Configuration(format!("failed to create data dir: {e}")))?;

    let snapshot_store: Arc<dyn SnapshotStore> =
        Arc::new(FileSnapshotStore::new(config.data_dir.clone()));

    let blob_store: Arc<dyn BlobStore> = Arc::new(NoopBlobStore);
    let event_bridge = Arc::new(BroadcastEventBridge::new(EVENT_CHANNEL_CAPACITY));
    let registry = Arc::new(GlobalRegistry::new(
        Arc::clone(&blob_store),
        Arc::new(spawner.clone()),
        Arc::clone(&event_bridge),
    ));
    if let Some(snapshot) = snapshot_store.load()? {
        registry.restore(snapshot.data);
        log::info!("[bootstrap] restored rooms from snapshot");
    }

    let music_provider: Arc<dyn MusicProvider> = Arc::new(HttpMusicProvider::new(
        http_client.clone(),
        config.provider_url.clone(),
    ));

    let ws_manager = Arc::new(WsConnectionManager::new());

    Ok(BootstrappedServices {
        registry,
        blob_store,
        music_provider,
        snapshot_store,
        event_bridge,
        ws_manager,
        http_client,
        spawner,
        cancel_token,
        config: Arc::new(config.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_client_is_constructed() {
        let client = create_http_client();
        assert!(client.get("http://example.com").build().is_ok());
    }

    #[test]
    fn bootstrap_services_wires_registry_and_provider() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        let services = bootstrap_services(&config).unwrap();
        assert_eq!(services.registry.room_count(), 0);
    }

    #[test]
    fn bootstrap_services_rejects_invalid_config() {
        let mut config = Config::default();
        config.bind_host = String::new();
        assert!(bootstrap_services(&config).is_err());
    }
}
