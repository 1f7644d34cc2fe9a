//! Bounded, jittered exponential backoff shared by C4's status poll and C5's
//! handler retries (spec §7).

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Returns the delay for the next attempt and advances internal state.
    /// Jittered uniformly in `[0.5, 1.0)` of the capped exponential value, in
    /// the manner of the teacher's dequeue-interval jitter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.base.saturating_mul(1u32 << self.attempt.min(16));
        let capped = exp.min(self.max);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = 0.5 + rand::random::<f64>() * 0.5; // [0.5, 1.0)
        capped.mul_f64(jitter)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_caps() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        let mut last = Duration::ZERO;
        for _ in 0..10 {
            let d = b.next_delay();
            assert!(d <= Duration::from_secs(1));
            last = d;
        }
        let _ = last;
        assert_eq!(b.attempt(), 10);
    }
}
