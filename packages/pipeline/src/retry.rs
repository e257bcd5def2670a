//! Shared backoff policy for outbound calls.
//!
//! Exponential with a 2 s base and a 10 s cap, full jitter: the actual
//! delay is drawn uniformly from zero up to the capped exponential value.

use std::time::Duration;

use rand::Rng;

const BASE_DELAY_SECS: u64 = 2;
const MAX_DELAY_SECS: u64 = 10;

/// Delay before retry number `attempt` (1-based: first retry = 1).
pub(crate) fn full_jitter_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY_SECS.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    let cap_ms = exp.min(MAX_DELAY_SECS) * 1000;
    let jittered = rand::thread_rng().gen_range(0..=cap_ms);
    Duration::from_millis(jittered)
}
