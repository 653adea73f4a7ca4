use crate::AppState;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Mutex;
use std::time::Instant;

/// Global token bucket.
///
/// Not keyed by client: a kiosk has a handful of callers, and the point is
/// to keep a runaway client from flooding the store with uploads.
#[derive(Debug)]
pub struct SimpleRateLimiter {
    // (last_update, tokens)
    state: Mutex<(Instant, f32)>,
    rate_per_sec: f32,
    burst_size: f32,
}

impl SimpleRateLimiter {
    pub fn new(rate_per_sec: f32, burst_size: f32) -> Self {
        let burst_size = burst_size.max(1.0);
        Self {
            state: Mutex::new((Instant::now(), burst_size)),
            rate_per_sec,
            burst_size,
        }
    }

    /// Take one token if available.
    pub fn check(&self) -> bool {
        self.check_at(Instant::now())
    }

    fn check_at(&self, now: Instant) -> bool {
        let mut guard = self.state.lock().unwrap();
        let (last_update, tokens) = *guard;
        let elapsed = now.saturating_duration_since(last_update).as_secs_f32();

        let available = (tokens + elapsed * self.rate_per_sec).min(self.burst_size);

        if available >= 1.0 {
            *guard = (now, available - 1.0);
            true
        } else {
            // Record the refill even when denying.
            *guard = (now, available);
            false
        }
    }
}

/// Middleware to enforce rate limits
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.config.resilience.rate_limit_enabled && !state.rate_limiter.check() {
        tracing::warn!(name: "rate_limit.rejected", path = %req.uri().path(), "Request rate limited");
        return Err(ApiError::too_many_requests());
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_simple_rate_limiter() {
        let limiter = SimpleRateLimiter::new(2.0, 5.0); // 2 req/s, 5 burst
        let start = Instant::now();

        // Consume all burst
        for _ in 0..5 {
            assert!(limiter.check_at(start));
        }

        // Next should fail (immediate)
        assert!(!limiter.check_at(start));

        // 0.6s later -> +1.2 tokens -> one request passes
        let later = start + Duration::from_millis(600);
        assert!(limiter.check_at(later));

        // Immediate fail
        assert!(!limiter.check_at(later));
    }

    #[test]
    fn test_refill_is_capped_at_burst() {
        let limiter = SimpleRateLimiter::new(100.0, 2.0);
        let start = Instant::now();
        let much_later = start + Duration::from_secs(60);

        assert!(limiter.check_at(much_later));
        assert!(limiter.check_at(much_later));
        assert!(!limiter.check_at(much_later));
    }
}
