//! Bot poll backoff: each empty poll grows the sleep interval; any
//! successful claim resets it. Jitter comes from `backoff`'s randomized
//! exponential backoff rather than a hand-rolled RNG call.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::time::Duration;

/// Tracks a bot's `sleep_streak` and hands back how long it should
/// sleep before polling again.
pub struct PollBackoff {
    inner: ExponentialBackoff,
    streak: u32,
}

impl PollBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let inner = ExponentialBackoff {
            initial_interval: base,
            max_interval: max,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        Self { inner, streak: 0 }
    }

    /// Call after an empty poll (no task claimed). Returns the sleep
    /// duration for this attempt.
    pub fn next_sleep(&mut self) -> Duration {
        self.streak += 1;
        self.inner.next_backoff().unwrap_or(self.inner.max_interval)
    }

    /// Call after a poll that claimed a task. Resets the streak so the
    /// next empty poll starts from the base interval again.
    pub fn reset(&mut self) {
        self.streak = 0;
        self.inner.reset();
    }

    pub const fn sleep_streak(&self) -> u32 {
        self.streak
    }
}
