//! Reconnect backoff shared by the tunnel supervisor (§4.3) and the fleet
//! reconciler's resolver fetch loop (§4.4): exponential, factor 2.0, min
//! 5s, max 60s, no jitter so the sequence is deterministic and testable.

use std::time::Duration;

use backoff::backoff::Backoff as _;
use backoff::ExponentialBackoff;

pub const MIN_BACKOFF: Duration = Duration::from_secs(5);
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);
const MULTIPLIER: f64 = 2.0;

/// Wraps `backoff::ExponentialBackoff` with the fixed parameters every
/// reconnect loop in this crate uses, and a `Duration`-returning
/// `next()` that never reports exhaustion (there is no `max_elapsed_time`
/// — callers decide for themselves when to stop retrying).
pub struct ReconnectBackoff(ExponentialBackoff);

impl ReconnectBackoff {
    pub fn new() -> Self {
        let inner = ExponentialBackoff {
            current_interval: MIN_BACKOFF,
            initial_interval: MIN_BACKOFF,
            randomization_factor: 0.0,
            multiplier: MULTIPLIER,
            max_interval: MAX_BACKOFF,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        Self(inner)
    }

    /// Next sleep duration, doubling the previous one and saturating at
    /// `MAX_BACKOFF`.
    pub fn next(&mut self) -> Duration {
        self.0.next_backoff().unwrap_or(MAX_BACKOFF)
    }

    /// Resets the schedule to `MIN_BACKOFF`. Called after a session ran
    /// longer than `MAX_BACKOFF` (counts as healthy) or after a
    /// successful resolver fetch.
    pub fn reset(&mut self) {
        self.0.reset();
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new()
    }
}
