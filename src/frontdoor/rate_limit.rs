//! Token bucket evaluated before every page request.

use tokio::time::Instant;

/// Capacity `C`, continuous refill `R` tokens per second.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_per_second,
            tokens: f64::from(capacity),
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_update = now;
    }

    /// Take one token if available.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn rejects_exactly_the_overflowing_request() {
        let mut bucket = TokenBucket::new(5, 1.0);
        let admitted: Vec<bool> = (0..6).map(|_| bucket.try_acquire()).collect();
        assert_eq!(admitted, vec![true, true, true, true, true, false]);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_capped_at_capacity() {
        let mut bucket = TokenBucket::new(2, 10.0);
        assert!(bucket.try_acquire());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(bucket.available(), 2.0);
    }
}
