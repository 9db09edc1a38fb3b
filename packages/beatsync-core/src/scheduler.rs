//! Monotonic server time and scheduled-execution-time computation (C1).
//!
//! Server time is UNIX epoch milliseconds. `scheduled_execution_time` folds
//! the worst observed RTT across a room's connected clients into a future
//! timestamp every client can act on simultaneously: far enough out that
//! even the slowest client's next frame will have arrived, never so far out
//! that one bad peer stalls everyone.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol_constants::{
    CAP_SCHEDULE_MS, MIN_SCHEDULE_MS, SCHEDULE_PROCESSING_BUFFER_MS, SCHEDULE_RTT_MULTIPLIER,
};

/// Current server time, UNIX epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_millis() as u64
}

/// Computes a future timestamp all connected clients should act on.
///
/// `max_rtt_ms` is the worst RTT among the room's connected clients.
/// `extra_ms` is additional lead time (e.g. `SYNC_EXTRA_MS` for late joiners).
pub fn scheduled_execution_time(max_rtt_ms: u64, extra_ms: u64) -> u64 {
    let rtt_term = (max_rtt_ms as f64 * SCHEDULE_RTT_MULTIPLIER) as u64;
    let lead = (rtt_term + SCHEDULE_PROCESSING_BUFFER_MS)
        .max(MIN_SCHEDULE_MS)
        .min(CAP_SCHEDULE_MS);
    now_ms() + lead + extra_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors_at_min_schedule_for_zero_rtt() {
        let t = scheduled_execution_time(0, 0);
        let now = now_ms();
        assert!(t >= now + MIN_SCHEDULE_MS);
        assert!(t <= now + MIN_SCHEDULE_MS + 50);
    }

    #[test]
    fn caps_at_cap_schedule_for_huge_rtt() {
        let t = scheduled_execution_time(100_000, 0);
        let now = now_ms();
        assert!(t <= now + CAP_SCHEDULE_MS + 50);
    }

    #[test]
    fn extra_ms_is_additive_on_top_of_the_cap() {
        let t = scheduled_execution_time(100_000, 1500);
        let now = now_ms();
        assert!(t >= now + CAP_SCHEDULE_MS + 1500);
        assert!(t <= now + CAP_SCHEDULE_MS + 1500 + 50);
    }

    #[test]
    fn moderate_rtt_falls_between_bounds() {
        // rtt=1000 -> rtt_term=1500, +200 buffer = 1700, within [MIN,CAP]
        let t = scheduled_execution_time(1000, 0);
        let now = now_ms();
        assert!(t >= now + 1700 - 10);
        assert!(t <= now + 1700 + 50);
    }
}
