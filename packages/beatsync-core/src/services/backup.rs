//! Backup/restore (C9): serialize/deserialize the registry, periodic
//! snapshots, startup restore.
//!
//! Grounded on this stack's atomic local-config persistence: write to a
//! temp file, then rename over the target, guarded by a process-wide mutex
//! so a periodic timer and a shutdown-triggered save can never interleave
//! and corrupt the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{BeatsyncError, BeatsyncResult};
use crate::model::{ChatMessage, Client, PlaybackState};

const SNAPSHOT_FILE: &str = "beatsync_snapshot.json";

static SNAPSHOT_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn snapshot_lock() -> &'static Mutex<()> {
    SNAPSHOT_LOCK.get_or_init(|| Mutex::new(()))
}

/// One room's worth of persisted state (spec.md §6 persisted snapshot schema).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub client_datas: Vec<Client>,
    pub audio_sources: Vec<String>,
    pub global_volume: f32,
    pub playback_state: Option<PlaybackState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub messages: Vec<ChatMessage>,
    pub next_message_id: u64,
}

/// The whole registry's persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: u64,
    pub data: SnapshotData,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SnapshotData {
    pub rooms: HashMap<String, RoomSnapshot>,
}

/// Trait for the backup storage collaborator. The core exposes
/// `serialize()`/`restore()` over this abstract store rather than baking in
/// a particular backend (spec.md §9).
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &Snapshot) -> BeatsyncResult<()>;
    fn load(&self) -> BeatsyncResult<Option<Snapshot>>;
}

/// Atomic-file-based default implementation: temp file + rename, matching
/// this stack's existing local persistence pattern.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> BeatsyncResult<()> {
        let _guard = snapshot_lock().lock();
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| BeatsyncError::Backup(e.to_string()))?;
        let path = self.path();
        let temp_path = self.dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        let contents =
            serde_json::to_string_pretty(snapshot).map_err(|e| BeatsyncError::Backup(e.to_string()))?;

        std::fs::write(&temp_path, contents).map_err(|e| BeatsyncError::Backup(e.to_string()))?;
        std::fs::rename(&temp_path, &path).map_err(|e| BeatsyncError::Backup(e.to_string()))
    }

    fn load(&self) -> BeatsyncResult<Option<Snapshot>> {
        let _guard = snapshot_lock().lock();
        let path = self.path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| BeatsyncError::Backup(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BeatsyncError::Backup(e.to_string())),
        }
    }
}

/// An in-memory store used in tests so snapshot round-trips don't touch disk.
#[cfg(test)]
pub(crate) struct MemorySnapshotStore {
    slot: Mutex<Option<Snapshot>>,
}

#[cfg(test)]
impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

#[cfg(test)]
impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> BeatsyncResult<()> {
        *self.slot.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> BeatsyncResult<Option<Snapshot>> {
        Ok(self.slot.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_snapshot() -> Snapshot {
        let mut rooms = HashMap::new();
        rooms.insert(
            "123456".to_string(),
            RoomSnapshot {
                client_datas: vec![],
                audio_sources: vec!["u1".into()],
                global_volume: 0.7,
                playback_state: Some(PlaybackState::initial()),
                chat: None,
            },
        );
        Snapshot {
            timestamp: 1_000,
            data: SnapshotData { rooms },
        }
    }

    #[test]
    fn file_store_round_trips_a_snapshot() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let snapshot = sample_snapshot();

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded.timestamp, 1_000);
        assert_eq!(
            loaded.data.rooms["123456"].global_volume,
            snapshot.data.rooms["123456"].global_volume
        );
    }

    #[test]
    fn file_store_load_returns_none_when_missing() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("nested"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemorySnapshotStore::new();
        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.timestamp, snapshot.timestamp);
    }
}
