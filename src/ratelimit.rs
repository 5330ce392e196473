//! # Rate limiter
//! Token bucket guarding outbound calls to one provider.
//!
//! The budget refills continuously at `max_requests / time_window` tokens per
//! second and is capped at `max_requests`. The mutex covers only the
//! read-modify-write of the bucket; it is released before a waiter sleeps so
//! other acquirers are never queued behind a sleeping task.

use std::sync::Mutex;
use std::time::Duration;

use metrics::histogram;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ScoringError;

/// Thread-safe token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    max_tokens: f64,
    /// Tokens per second.
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, max_tokens: f64, rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).clamp(0.0, max_tokens);
        self.last_refill = now;
    }
}

impl RateLimiter {
    /// `max_requests` per `time_window`, starting with a full bucket.
    pub fn new(max_requests: u32, time_window: Duration) -> Self {
        let max_tokens = f64::from(max_requests.max(1));
        let window = time_window.as_secs_f64().max(f64::EPSILON);
        Self {
            max_tokens,
            refill_rate: max_tokens / window,
            bucket: Mutex::new(Bucket {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Convenience constructor for a requests-per-minute budget.
    pub fn per_minute(rpm: u32) -> Self {
        Self::new(rpm, Duration::from_secs(60))
    }

    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }

    /// Wait for one unit of budget. Fails once the cumulative wait would
    /// exceed `timeout`.
    pub async fn acquire(&self, timeout: Duration) -> Result<(), ScoringError> {
        let started = Instant::now();
        loop {
            let wait = {
                let mut b = self.lock();
                b.refill(Instant::now(), self.max_tokens, self.refill_rate);
                if b.tokens >= 1.0 {
                    b.tokens -= 1.0;
                    let waited = started.elapsed();
                    if !waited.is_zero() {
                        histogram!("digest_ratelimit_wait_ms").record(waited.as_secs_f64() * 1_000.0);
                    }
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - b.tokens) / self.refill_rate)
            };

            if started.elapsed() + wait > timeout {
                return Err(ScoringError::RateLimitTimeout { timeout });
            }
            debug!(target: "ratelimit", wait_ms = wait.as_millis() as u64, "waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens available right now (after refill), in `[0, max_tokens]`.
    pub fn available_tokens(&self) -> f64 {
        let mut b = self.lock();
        b.refill(Instant::now(), self.max_tokens, self.refill_rate);
        b.tokens
    }

    pub fn reset(&self) {
        let mut b = self.lock();
        b.tokens = self.max_tokens;
        b.last_refill = Instant::now();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bucket> {
        // The bucket holds plain numbers; a poisoned guard is still consistent.
        self.bucket.lock().unwrap_or_else(|p| p.into_inner())
    }
}
