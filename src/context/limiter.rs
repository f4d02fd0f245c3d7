use crate::core::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Paces item delivery during query and scan iteration.
///
/// Consulted once before each item is handed to the visitor.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn acquire(&self);
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket: `rate` permits per second, bursting up to `burst`.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    /// Fails with `InvalidOptions` unless the rate is finite and positive.
    pub fn new(rate_per_second: f64, burst: usize) -> Result<Self> {
        if !rate_per_second.is_finite() || rate_per_second <= 0.0 {
            return Err(Error::InvalidOptions(format!(
                "token bucket rate must be finite and positive, got {}",
                rate_per_second
            )));
        }

        let burst = burst.max(1) as f64;
        Ok(Self {
            rate: rate_per_second,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                refilled_at: Instant::now(),
            }),
        })
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn acquire(&self) {
        let mut bucket = self.bucket.lock().await;

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.refilled_at = now;

        if bucket.tokens < 1.0 {
            // Very slow rates saturate instead of overflowing `Duration`.
            let wait = Duration::try_from_secs_f64((1.0 - bucket.tokens) / self.rate)
                .unwrap_or(Duration::MAX);
            tokio::time::sleep(wait).await;
            bucket.tokens = 1.0;
            bucket.refilled_at = Instant::now();
        }
        bucket.tokens -= 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_is_immediate_then_paced() {
        let limiter = TokenBucket::new(100.0, 3).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(20));

        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_rejects_rates_that_cannot_refill() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                TokenBucket::new(rate, 1),
                Err(Error::InvalidOptions(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_tiny_rate_waits_instead_of_panicking() {
        let limiter = TokenBucket::new(1e-30, 1).unwrap();
        limiter.acquire().await;

        let second = tokio::time::timeout(Duration::from_millis(20), limiter.acquire()).await;
        assert!(second.is_err());
    }
}
