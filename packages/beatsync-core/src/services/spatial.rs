//! Spatial audio mixing engine (C8): gain-from-distance.
//!
//! Pure functions only — no lock, no I/O. `Room` calls into this module to
//! recompute gains whenever the listening source moves, a client moves, or
//! the 100 ms spatial ticker fires.

use std::collections::HashMap;

use crate::model::{Client, GainEntry, Position};
use crate::protocol_constants::{
    AUDIO_GAIN_HIGH, AUDIO_GAIN_LOW, SPATIAL_FAR_RADIUS, SPATIAL_NEAR_RADIUS,
    SPATIAL_RAMP_TIME_SECS,
};

fn distance(a: Position, b: Position) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Monotone-nonincreasing gain curve: full gain at or inside the near
/// radius, linearly decaying to the floor at or beyond the far radius.
pub fn gain_for_distance(distance: f64) -> f32 {
    if distance <= SPATIAL_NEAR_RADIUS {
        return AUDIO_GAIN_HIGH;
    }
    if distance >= SPATIAL_FAR_RADIUS {
        return AUDIO_GAIN_LOW;
    }
    let t = (distance - SPATIAL_NEAR_RADIUS) / (SPATIAL_FAR_RADIUS - SPATIAL_NEAR_RADIUS);
    AUDIO_GAIN_HIGH + (AUDIO_GAIN_LOW - AUDIO_GAIN_HIGH) * t as f32
}

/// Computes a gain entry for every connected client relative to `source`.
pub fn compute_gains(
    clients: &[Client],
    source: Position,
) -> HashMap<String, GainEntry> {
    clients
        .iter()
        .map(|client| {
            let gain = gain_for_distance(distance(client.position, source));
            (
                client.client_id.clone(),
                GainEntry {
                    gain,
                    ramp_time: SPATIAL_RAMP_TIME_SECS,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_is_full_at_zero_distance() {
        assert_eq!(gain_for_distance(0.0), AUDIO_GAIN_HIGH);
    }

    #[test]
    fn gain_is_full_at_near_radius() {
        assert_eq!(gain_for_distance(SPATIAL_NEAR_RADIUS), AUDIO_GAIN_HIGH);
    }

    #[test]
    fn gain_is_floor_at_far_radius() {
        assert_eq!(gain_for_distance(SPATIAL_FAR_RADIUS), AUDIO_GAIN_LOW);
    }

    #[test]
    fn gain_is_floor_beyond_far_radius() {
        assert_eq!(gain_for_distance(SPATIAL_FAR_RADIUS * 10.0), AUDIO_GAIN_LOW);
    }

    #[test]
    fn gain_decreases_monotonically_with_distance() {
        let mut prev = gain_for_distance(SPATIAL_NEAR_RADIUS);
        let mut d = SPATIAL_NEAR_RADIUS;
        while d <= SPATIAL_FAR_RADIUS {
            let g = gain_for_distance(d);
            assert!(g <= prev + f32::EPSILON);
            prev = g;
            d += 1.0;
        }
    }

    #[test]
    fn gain_is_never_outside_bounds() {
        for i in 0..200 {
            let g = gain_for_distance(i as f64);
            assert!(g >= AUDIO_GAIN_LOW && g <= AUDIO_GAIN_HIGH);
        }
    }

    #[test]
    fn compute_gains_covers_every_client() {
        let clients = vec![
            Client {
                client_id: "a".into(),
                username: "A".into(),
                joined_at: 0,
                last_heartbeat_at: 0,
                rtt: 0,
                is_admin: true,
                position: Position { x: 50.0, y: 50.0 },
                location: None,
            },
            Client {
                client_id: "b".into(),
                username: "B".into(),
                joined_at: 0,
                last_heartbeat_at: 0,
                rtt: 0,
                is_admin: false,
                position: Position { x: 0.0, y: 0.0 },
                location: None,
            },
        ];
        let gains = compute_gains(&clients, Position { x: 50.0, y: 50.0 });
        assert_eq!(gains.len(), 2);
        assert_eq!(gains["a"].gain, AUDIO_GAIN_HIGH);
        assert_eq!(gains["b"].gain, AUDIO_GAIN_LOW);
    }
}
