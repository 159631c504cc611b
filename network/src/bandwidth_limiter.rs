//! Token-bucket rate limiting, one bucket per traffic direction.

use std::sync::Mutex;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket: `rate` bytes per second refill, `burst` bytes capacity.
/// A rate of zero disables limiting entirely.
pub struct BandwidthLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BandwidthLimiter {
    pub fn new(rate: usize, burst: usize) -> Self {
        Self {
            rate: rate as f64,
            burst: burst as f64,
            bucket: Mutex::new(Bucket {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Try to consume `size` bytes; false means the caller should drop.
    pub fn should_pass(&self, size: usize) -> bool {
        if self.rate == 0.0 {
            return true;
        }
        let mut bucket = self.bucket.lock().unwrap();
        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.last_refill = Instant::now();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        if bucket.tokens >= size as f64 {
            bucket.tokens -= size as f64;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_is_unlimited() {
        let limiter = BandwidthLimiter::new(0, 0);
        for _ in 0..1000 {
            assert!(limiter.should_pass(usize::MAX / 2));
        }
    }

    #[test]
    fn burst_then_throttle() {
        let limiter = BandwidthLimiter::new(1000, 5000);
        assert!(limiter.should_pass(5000));
        // Bucket drained; an immediate large send is rejected.
        assert!(!limiter.should_pass(4000));
        // Small sends pass once a little refill has accumulated.
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(limiter.should_pass(10));
    }

    #[test]
    fn refill_caps_at_burst() {
        let limiter = BandwidthLimiter::new(1_000_000, 100);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(limiter.should_pass(100));
        assert!(!limiter.should_pass(100));
    }
}
