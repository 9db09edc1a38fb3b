//! Event emitter abstraction for decoupling room/registry logic from
//! whatever observes lifecycle events (logs today, metrics later).

use super::RoomLifecycleEvent;

/// Trait for emitting room lifecycle events without knowledge of the sink.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: RoomLifecycleEvent);
}

/// Discards every event. Used in tests and when observability is disabled.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: RoomLifecycleEvent) {}
}

/// Logs every event at debug level via `tracing`.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, event: RoomLifecycleEvent) {
        tracing::debug!(?event, "room_lifecycle_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEventEmitter {
        count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit(&self, _event: RoomLifecycleEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = CountingEventEmitter {
            count: AtomicUsize::new(0),
        };
        emitter.emit(RoomLifecycleEvent::Created {
            room_id: "123456".into(),
            timestamp: 0,
        });
        emitter.emit(RoomLifecycleEvent::ClientJoined {
            room_id: "123456".into(),
            client_id: "c1".into(),
            timestamp: 0,
        });
        assert_eq!(emitter.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn noop_emitter_does_not_panic() {
        NoopEventEmitter.emit(RoomLifecycleEvent::Cleaned {
            room_id: "123456".into(),
            timestamp: 0,
        });
    }
}
