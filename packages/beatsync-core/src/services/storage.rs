//! Object storage collaborator boundary (§1 external collaborators, §9
//! "Backup collaborator").
//!
//! The core never links an object-storage SDK. It only needs to mint a
//! presigned upload URL and to delete every blob under a room's prefix on
//! cleanup — both expressed as a trait so a real implementation can be
//! swapped in without touching `Room`.

use async_trait::async_trait;

use crate::error::BeatsyncResult;

/// Trait for the audio-blob object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Deletes every blob whose key starts with `prefix` (e.g. `room-123456/`).
    /// Must be safe to call on a prefix with zero matching blobs, and safe
    /// to retry (spec.md §5: "idempotent, safe for retried deletes").
    async fn delete_prefix(&self, prefix: &str) -> BeatsyncResult<()>;

    /// Deletes a single blob by its full URL/key (§4.5.4 `deleteAudioSources`).
    async fn delete(&self, url: &str) -> BeatsyncResult<()>;

    /// Mints a presigned upload URL for `key`, returned to the client so it
    /// can PUT the audio blob directly without routing bytes through this server.
    async fn presign_upload(&self, key: &str) -> BeatsyncResult<String>;
}

/// A no-op store used when no object-storage backend is configured. Logs and
/// succeeds, so the rest of the system can run (and be tested) without a
/// real bucket.
#[derive(Debug, Default)]
pub struct NoopBlobStore;

#[async_trait]
impl BlobStore for NoopBlobStore {
    async fn delete_prefix(&self, prefix: &str) -> BeatsyncResult<()> {
        log::info!("[storage] no-op delete_prefix({prefix})");
        Ok(())
    }

    async fn delete(&self, url: &str) -> BeatsyncResult<()> {
        log::info!("[storage] no-op delete({url})");
        Ok(())
    }

    async fn presign_upload(&self, key: &str) -> BeatsyncResult<String> {
        log::info!("[storage] no-op presign_upload({key})");
        Ok(format!("https://example.invalid/upload/{key}"))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct MockBlobStore {
        pub delete_called: AtomicBool,
        pub delete_count: AtomicUsize,
        pub fail_delete: AtomicBool,
    }

    #[async_trait]
    impl BlobStore for MockBlobStore {
        async fn delete_prefix(&self, _prefix: &str) -> BeatsyncResult<()> {
            self.delete_called.store(true, Ordering::SeqCst);
            self.delete_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(crate::error::BeatsyncError::Storage("mock failure".into()));
            }
            Ok(())
        }

        async fn delete(&self, _url: &str) -> BeatsyncResult<()> {
            self.delete_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(crate::error::BeatsyncError::Storage("mock failure".into()));
            }
            Ok(())
        }

        async fn presign_upload(&self, key: &str) -> BeatsyncResult<String> {
            Ok(format!("https://mock.invalid/{key}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockBlobStore;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn noop_store_succeeds_on_empty_prefix() {
        let store = NoopBlobStore;
        assert!(store.delete_prefix("room-000000/").await.is_ok());
    }

    #[tokio::test]
    async fn mock_store_tracks_delete_calls() {
        let mock = MockBlobStore::default();
        mock.delete_prefix("room-123456/").await.unwrap();
        assert!(mock.delete_called.load(Ordering::SeqCst));
        assert_eq!(mock.delete_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mock_store_can_simulate_failure() {
        let mock = MockBlobStore::default();
        mock.fail_delete.store(true, Ordering::SeqCst);
        assert!(mock.delete_prefix("room-123456/").await.is_err());
    }
}
