//! Process-wide token bucket guarding the credential endpoints.
//!
//! The bucket holds up to `per_sec` tokens and refills continuously at
//! `per_sec` tokens per second. Each login, registration or refresh request
//! spends one token; an empty bucket answers 429 with `Retry-After`.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::{Extension, Request};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

#[derive(Clone)]
pub struct RateLimiter {
    per_sec: f64,
    bucket: Arc<Mutex<Bucket>>,
}

impl RateLimiter {
    /// A full bucket of `per_sec` tokens. Zero is treated as one.
    pub fn new(per_sec: u64) -> Self {
        let per_sec = per_sec.max(1) as f64;
        Self {
            per_sec,
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: per_sec,
                refilled_at: Instant::now(),
            })),
        }
    }

    /// Spend a token. On refusal, returns the whole seconds until one is available.
    fn try_acquire_at(&self, now: Instant) -> Result<(), u64> {
        let Ok(mut bucket) = self.bucket.lock() else {
            // Fail open on a poisoned lock.
            return Ok(());
        };

        let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.per_sec).min(self.per_sec);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let wait = (1.0 - bucket.tokens) / self.per_sec;
            Err(wait.ceil().max(1.0) as u64)
        }
    }

    fn try_acquire(&self) -> Result<(), u64> {
        self.try_acquire_at(Instant::now())
    }
}

/// Axum middleware that enforces the rate limit.
pub async fn rate_limit_middleware(
    Extension(limiter): Extension<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    match limiter.try_acquire() {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            tracing::warn!(path = %req.uri().path(), retry_after, "Rate limit exceeded");
            let mut resp = ApiError::TooManyRequests(
                "Too many requests, please try again later".to_string(),
            )
            .into_response();
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            resp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_up_to_capacity() {
        let limiter = RateLimiter::new(3);
        let now = Instant::now();
        assert!(limiter.try_acquire_at(now).is_ok());
        assert!(limiter.try_acquire_at(now).is_ok());
        assert!(limiter.try_acquire_at(now).is_ok());
        assert_eq!(limiter.try_acquire_at(now), Err(1));
    }

    #[test]
    fn test_refills_over_time() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        assert!(limiter.try_acquire_at(start).is_ok());
        assert!(limiter.try_acquire_at(start).is_ok());
        assert!(limiter.try_acquire_at(start).is_err());

        // Half a second at 2/s buys one more request, not two.
        let later = start + Duration::from_millis(500);
        assert!(limiter.try_acquire_at(later).is_ok());
        assert!(limiter.try_acquire_at(later).is_err());
    }

    #[test]
    fn test_zero_limit_still_allows_one() {
        let limiter = RateLimiter::new(0);
        assert!(limiter.try_acquire().is_ok());
    }
}
