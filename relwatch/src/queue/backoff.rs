//! Retry delays for failed jobs.

use rand::random;
use std::time::Duration;

/// Upper bound for a single retry delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// `base * 2^(attempt - 1)` capped at [`MAX_BACKOFF`], plus up to 25% jitter.
///
/// `attempt` is the 1-based number of the attempt that just failed.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(MAX_BACKOFF.as_millis()).unwrap_or(u64::MAX);

    let capped_ms = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
    let jitter_ms = random::<u64>() % (capped_ms / 4 + 1);
    Duration::from_millis(capped_ms.saturating_add(jitter_ms))
}
