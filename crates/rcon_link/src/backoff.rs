//! Capped exponential reconnect delay.

use std::time::Duration;

/// Reconnect delay sequence: `initial`, `2 * initial`, `4 * initial`, ...
/// capped at `max`. Attempts are unlimited.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Delay before the next attempt; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the initial delay, after a successful connect.
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}
