//! Application services layer: the room state machine and its collaborators.

pub mod backup;
pub mod dispatcher;
pub mod provider;
pub mod registry;
pub mod room;
pub mod spatial;
pub mod storage;

pub use backup::{RoomSnapshot, Snapshot, SnapshotData, SnapshotStore};
pub use provider::{MusicProvider, TrackResult};
pub use registry::GlobalRegistry;
pub use room::Room;
pub use storage::BlobStore;
