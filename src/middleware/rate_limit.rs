//! Rate limiting middleware using token bucket algorithm

use super::{HttpRequest, HttpResponse, Middleware, Next, RequestContext};
use crate::config::RateLimitConfig;
use crate::error::{MirageError, Result};
use crate::observability::Metrics;
use crate::render::error_response;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::warn;

/// Micro-tokens per whole token, so fractional rates refill smoothly
const SCALE: u64 = 1_000_000;

/// Token bucket shared by every client
struct TokenBucket {
    /// Available micro-tokens
    tokens: AtomicU64,
    /// Last refill, in milliseconds since `origin`
    last_refill: AtomicU64,
    /// Bucket capacity in micro-tokens
    max_tokens: u64,
    /// Micro-tokens added per millisecond
    refill_per_ms: u64,
    origin: Instant,
}

impl TokenBucket {
    fn new(rate: f64, burst: u32) -> Self {
        let max_tokens = u64::from(burst) * SCALE;
        // rate tokens per second = rate * SCALE / 1000 micro-tokens per ms
        let refill_per_ms = ((rate * SCALE as f64) / 1000.0).round().max(1.0) as u64;

        Self {
            tokens: AtomicU64::new(max_tokens),
            last_refill: AtomicU64::new(0),
            max_tokens,
            refill_per_ms,
            origin: Instant::now(),
        }
    }

    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn refill(&self) {
        let now = self.now_millis();
        let last = self.last_refill.load(Ordering::Acquire);
        let elapsed_ms = now.saturating_sub(last);
        if elapsed_ms == 0 {
            return;
        }
        // Only the thread that advances the clock adds tokens
        if self
            .last_refill
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let add = elapsed_ms.saturating_mul(self.refill_per_ms);
        let mut current = self.tokens.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(add).min(self.max_tokens);
            match self.tokens.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn try_acquire(&self) -> bool {
        self.refill();

        let mut current = self.tokens.load(Ordering::Relaxed);
        loop {
            if current < SCALE {
                return false;
            }

            match self.tokens.compare_exchange_weak(
                current,
                current - SCALE,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Global rate limiter middleware
pub struct RateLimiter {
    bucket: TokenBucket,
    metrics: Arc<Metrics>,
}

impl RateLimiter {
    /// Build a limiter when both the rate and the burst are positive
    pub fn from_config(config: &RateLimitConfig, metrics: Arc<Metrics>) -> Option<Self> {
        if config.requests_per_second <= 0.0 || config.burst == 0 {
            return None;
        }
        Some(Self {
            bucket: TokenBucket::new(config.requests_per_second, config.burst),
            metrics,
        })
    }
}

#[async_trait]
impl Middleware for RateLimiter {
    async fn process(
        &self,
        request: HttpRequest,
        ctx: RequestContext,
        next: &dyn Next,
    ) -> Result<HttpResponse> {
        if self.bucket.try_acquire() {
            return next.run(request, ctx).await;
        }

        warn!(
            request_id = %ctx.request_id,
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        self.metrics.record_injection("rate_limit");

        Ok(error_response(&MirageError::RateLimitExceeded))
    }

    fn name(&self) -> &'static str {
        "rate_limiter"
    }
}
