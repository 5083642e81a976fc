//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// Attempt 0 is immediate; attempt `n` waits `base * 2^(n-1)` capped at
/// `max`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Backoff state for a reconnecting transport.
///
/// The first attempt after a disconnect is immediate; only consecutive
/// connect failures back off.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base_ms: u64,
    max_ms: u64,
    failures: u32,
}

impl ReconnectBackoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            failures: 0,
        }
    }

    /// Delay before the next connect attempt.
    pub fn next_delay(&self) -> Duration {
        calculate_backoff(self.failures, self.base_ms, self.max_ms)
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
