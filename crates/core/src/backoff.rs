// SPDX-License-Identifier: Apache-2.0

//! Exponential backoff with jitter, shared by every retrying worker loop:
//! the inbound queue, the hook outbox, and the notification/webhook
//! outboxes all compute their next retry time from the same curve.

use rand::Rng;
use std::time::Duration;

const FLOOR_SECS: f64 = 1.0;
const CEILING_SECS: f64 = 30.0;
const JITTER_FRACTION: f64 = 0.3;

/// `min(ceiling, floor * 2^attempt)`, jittered by ±`JITTER_FRACTION`.
///
/// `attempt` is the attempt number that just failed (1-indexed): the first
/// retry after attempt 1 uses `floor * 2^1`.
pub fn backoff(attempt: u32) -> Duration {
    let base = (FLOOR_SECS * 2f64.powi(attempt as i32)).min(CEILING_SECS);
    let jitter = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let jittered = (base * (1.0 + jitter)).max(0.0);
    Duration::from_secs_f64(jittered)
}

/// Same curve without the random jitter, for asserting the jittered
/// bounds in tests.
pub fn backoff_bounds(attempt: u32) -> (Duration, Duration) {
    let base = (FLOOR_SECS * 2f64.powi(attempt as i32)).min(CEILING_SECS);
    (
        Duration::from_secs_f64(base * (1.0 - JITTER_FRACTION)),
        Duration::from_secs_f64(base * (1.0 + JITTER_FRACTION)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_within_jittered_bounds() {
        for attempt in 1..10 {
            let (lo, hi) = backoff_bounds(attempt);
            for _ in 0..20 {
                let d = backoff(attempt);
                assert!(d >= lo && d <= hi, "attempt {attempt}: {d:?} not in [{lo:?}, {hi:?}]");
            }
        }
    }

    #[test]
    fn backoff_is_capped_at_ceiling() {
        let (_, hi) = backoff_bounds(20);
        assert!(hi <= Duration::from_secs_f64(CEILING_SECS * (1.0 + JITTER_FRACTION)));
    }
}
