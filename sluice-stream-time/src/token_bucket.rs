// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use std::ops::{Add, Sub};
use std::time::Duration;

/// Token bucket refilled with one token per `interval`, up to `capacity`.
///
/// Generic over the instant type so the arithmetic can be checked without a
/// runtime clock.
#[derive(Debug)]
pub(crate) struct TokenBucket<I> {
    capacity: u64,
    tokens: u64,
    interval: Duration,
    /// Time the last token was accounted for. Lies in the future while the
    /// bucket is in debt.
    last_update: I,
}

impl<I> TokenBucket<I>
where
    I: Copy + Ord + Add<Duration, Output = I> + Sub<I, Output = Duration>,
{
    /// Full bucket.
    pub(crate) const fn new(capacity: u64, interval: Duration, now: I) -> Self {
        Self {
            capacity,
            tokens: capacity,
            interval,
            last_update: now,
        }
    }

    fn refill(&mut self, now: I) {
        if now <= self.last_update {
            return;
        }
        if self.tokens >= self.capacity || self.interval.is_zero() {
            self.tokens = self.capacity;
            self.last_update = now;
            return;
        }
        let elapsed = now - self.last_update;
        let added = elapsed.as_nanos() / self.interval.as_nanos();
        if added == 0 {
            return;
        }
        let added = u64::try_from(added).unwrap_or(u64::MAX);
        self.tokens = self.tokens.saturating_add(added).min(self.capacity);
        if self.tokens == self.capacity {
            self.last_update = now;
        } else {
            let step = u32::try_from(added).unwrap_or(u32::MAX);
            self.last_update = self.last_update + self.interval.saturating_mul(step);
        }
    }

    /// Take `cost` tokens only if they are all available now.
    pub(crate) fn try_take(&mut self, now: I, cost: u64) -> bool {
        self.refill(now);
        if self.tokens >= cost {
            self.tokens -= cost;
            return true;
        }
        false
    }

    /// Take `cost` tokens, going into debt when they are missing.
    ///
    /// Returns how long the caller has to wait until the debt is covered;
    /// zero when the tokens were available.
    pub(crate) fn offer(&mut self, now: I, cost: u64) -> Duration {
        self.refill(now);
        if self.tokens >= cost {
            self.tokens -= cost;
            return Duration::ZERO;
        }
        let missing = u32::try_from(cost - self.tokens).unwrap_or(u32::MAX);
        let owed = self.interval.saturating_mul(missing);
        let delay = if self.last_update > now {
            owed + (self.last_update - now)
        } else {
            owed.saturating_sub(now - self.last_update)
        };
        self.tokens = 0;
        self.last_update = now + delay;
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::TokenBucket;
    use std::time::{Duration, Instant};

    const INTERVAL: Duration = Duration::from_millis(100);

    #[test]
    fn full_bucket_serves_a_burst_then_spaces_elements() {
        // Arrange
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2, INTERVAL, start);

        // Act
        let first = bucket.offer(start, 1);
        let second = bucket.offer(start, 1);
        let third = bucket.offer(start, 1);

        // Assert
        assert_eq!(first, Duration::ZERO);
        assert_eq!(second, Duration::ZERO);
        assert_eq!(third, INTERVAL);
    }

    #[test]
    fn debt_accumulates_across_offers() {
        // Arrange
        let start = Instant::now();
        let mut bucket = TokenBucket::new(1, INTERVAL, start);
        bucket.offer(start, 1);

        // Act
        let second = bucket.offer(start, 1);
        let third = bucket.offer(start, 1);

        // Assert
        assert_eq!(second, INTERVAL);
        assert_eq!(third, INTERVAL * 2);
    }

    #[test]
    fn tokens_refill_with_elapsed_time_up_to_capacity() {
        // Arrange
        let start = Instant::now();
        let mut bucket = TokenBucket::new(3, INTERVAL, start);
        for _ in 0..3 {
            bucket.try_take(start, 1);
        }

        // Act
        let later = start + INTERVAL * 10;
        let taken = (0..5).filter(|_| bucket.try_take(later, 1)).count();

        // Assert
        assert_eq!(taken, 3);
    }

    #[test]
    fn try_take_leaves_the_bucket_untouched_when_short() {
        // Arrange
        let start = Instant::now();
        let mut bucket = TokenBucket::new(1, INTERVAL, start);

        // Act
        let expensive = bucket.try_take(start, 2);
        let cheap = bucket.try_take(start, 1);

        // Assert
        assert!(!expensive);
        assert!(cheap);
    }

    #[test]
    fn partial_interval_shortens_the_wait() {
        // Arrange
        let start = Instant::now();
        let mut bucket = TokenBucket::new(1, INTERVAL, start);
        bucket.offer(start, 1);

        // Act
        let delay = bucket.offer(start + Duration::from_millis(40), 1);

        // Assert
        assert_eq!(delay, Duration::from_millis(60));
    }
}
