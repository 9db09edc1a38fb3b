//! Global room registry (C6).
//!
//! Cross-room state is disjoint, so unlike a room's own mutation lock, the
//! registry only needs a concurrent map: a room's own lock is the
//! serialization point for everything that happens inside it.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::events::{BroadcastEventBridge, EventEmitter, RoomLifecycleEvent};
use crate::runtime::TaskSpawner;
use crate::scheduler::now_ms;
use crate::services::backup::{RoomSnapshot, SnapshotData};
use crate::services::room::Room;
use crate::services::storage::BlobStore;

pub struct GlobalRegistry {
    rooms: DashMap<String, Arc<Room>>,
    blob_store: Arc<dyn BlobStore>,
    spawner: Arc<dyn TaskSpawner>,
    event_bridge: Arc<BroadcastEventBridge>,
}

impl GlobalRegistry {
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        spawner: Arc<dyn TaskSpawner>,
        event_bridge: Arc<BroadcastEventBridge>,
    ) -> Self {
        Self {
            rooms: DashMap::new(),
            blob_store,
            spawner,
            event_bridge,
        }
    }

    pub fn get_or_create_room(self: &Arc<Self>, room_id: &str) -> Arc<Room> {
        let mut created = false;
        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                created = true;
                Room::new(
                    room_id.to_string(),
                    self.blob_store.clone(),
                    self.spawner.clone(),
                    self.event_bridge.clone(),
                    Arc::downgrade(self),
                )
            })
            .clone();
        if created {
            self.event_bridge.emit(RoomLifecycleEvent::Created {
                room_id: room_id.to_string(),
                timestamp: now_ms(),
            });
        }
        room
    }

    pub fn get_room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|entry| entry.clone())
    }

    pub fn delete_room(&self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Rooms with at least one connected client, for the discovery endpoints.
    pub fn active_room_ids(&self) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|entry| entry.value().has_connected_clients())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Serializes the whole registry for periodic backup / shutdown (C9).
    pub fn create_backup(&self) -> SnapshotData {
        let rooms: HashMap<String, RoomSnapshot> = self
            .rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().create_backup()))
            .collect();
        SnapshotData { rooms }
    }

    /// Rebuilds the registry from a restored snapshot with no live sessions
    /// enrolled in any room (C9 startup restore).
    pub fn restore(self: &Arc<Self>, data: SnapshotData) {
        for (room_id, snapshot) in data.rooms {
            let room = Room::restore(
                room_id.clone(),
                snapshot,
                self.blob_store.clone(),
                self.spawner.clone(),
                self.event_bridge.clone(),
                Arc::downgrade(self),
            );
            self.rooms.insert(room_id, room);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::TokioSpawner;
    use crate::services::storage::NoopBlobStore;

    fn test_registry() -> Arc<GlobalRegistry> {
        Arc::new(GlobalRegistry::new(
            Arc::new(NoopBlobStore),
            Arc::new(TokioSpawner::current()),
            Arc::new(BroadcastEventBridge::new(8)),
        ))
    }

    #[tokio::test]
    async fn get_or_create_room_is_idempotent() {
        let registry = test_registry();
        let a = registry.get_or_create_room("123456");
        let b = registry.get_or_create_room("123456");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn delete_room_removes_it() {
        let registry = test_registry();
        registry.get_or_create_room("123456");
        registry.delete_room("123456");
        assert!(registry.get_room("123456").is_none());
    }

    #[tokio::test]
    async fn active_room_ids_excludes_empty_rooms() {
        let registry = test_registry();
        registry.get_or_create_room("111111");
        assert!(registry.active_room_ids().is_empty());
    }

    #[tokio::test]
    async fn backup_round_trips_through_restore() {
        let registry = test_registry();
        let room = registry.get_or_create_room("123456");
        room.set_audio_sources(vec!["u1".into()]);

        let snapshot = registry.create_backup();
        let restored = test_registry();
        restored.restore(snapshot);

        let room = restored.get_room("123456").unwrap();
        assert_eq!(room.create_backup().audio_sources, vec!["u1".to_string()]);
    }
}
