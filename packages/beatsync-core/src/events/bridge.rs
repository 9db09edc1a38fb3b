//! Bridges room lifecycle events to a broadcast channel an admin/metrics
//! consumer can subscribe to, independent of the per-room WebSocket
//! broadcast used for the wire protocol itself.

use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::RoomLifecycleEvent;

#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<RoomLifecycleEvent>,
}

impl BroadcastEventBridge {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomLifecycleEvent> {
        self.tx.subscribe()
    }
}

impl EventEmitter for BroadcastEventBridge {
    fn emit(&self, event: RoomLifecycleEvent) {
        if let Err(e) = self.tx.send(event) {
            log::trace!("[event-bridge] no subscribers: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_emitted_event() {
        let bridge = BroadcastEventBridge::new(8);
        let mut rx = bridge.subscribe();
        bridge.emit(RoomLifecycleEvent::Created {
            room_id: "123456".into(),
            timestamp: 0,
        });
        assert!(matches!(
            rx.try_recv().unwrap(),
            RoomLifecycleEvent::Created { .. }
        ));
    }
}
