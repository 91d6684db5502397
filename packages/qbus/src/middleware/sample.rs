//! Probabilistic wrappers: failure sampling and A/B traffic splits.
//!
//! Both draw a uniform integer in `[0, m)` and trigger when it is `< n`,
//! so the trigger probability is exactly `n/m`.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::handler::{Handler, HandlerError, HandlerResult, WorkerContext};

fn draw(rng: &Mutex<SmallRng>, m: u32) -> u32 {
    rng.lock().random_range(0..m)
}

/// Fails `n` of `m` requests with a caller-supplied error instead of
/// invoking the wrapped handler. Used to synthesize partial-failure
/// conditions against otherwise healthy handlers.
pub struct Sample {
    inner: Arc<dyn Handler>,
    n: u32,
    m: u32,
    error_message: String,
    rng: Mutex<SmallRng>,
}

impl Sample {
    /// Wraps `inner` to fail with probability `n/m`. `m` is clamped to at
    /// least 1.
    pub fn new(inner: Arc<dyn Handler>, n: u32, m: u32, error_message: impl Into<String>) -> Self {
        Self {
            inner,
            n,
            m: m.max(1),
            error_message: error_message.into(),
            rng: Mutex::new(SmallRng::from_os_rng()),
        }
    }

    /// Deterministic variant for tests.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(SmallRng::seed_from_u64(seed));
        self
    }
}

#[async_trait]
impl Handler for Sample {
    async fn handle(&self, ctx: &WorkerContext, subject: &str, body: &[u8]) -> HandlerResult {
        if draw(&self.rng, self.m) < self.n {
            return Err(HandlerError::msg(self.error_message.clone()));
        }
        self.inner.handle(ctx, subject, body).await
    }
}

/// Sends `n` of `m` requests to handler A, the rest to handler B.
pub struct AbSplit {
    a: Arc<dyn Handler>,
    b: Arc<dyn Handler>,
    n: u32,
    m: u32,
    rng: Mutex<SmallRng>,
}

impl AbSplit {
    /// Invokes `a` with probability `n/m`, otherwise `b`. `m` is clamped
    /// to at least 1.
    pub fn new(a: Arc<dyn Handler>, b: Arc<dyn Handler>, n: u32, m: u32) -> Self {
        Self {
            a,
            b,
            n,
            m: m.max(1),
            rng: Mutex::new(SmallRng::from_os_rng()),
        }
    }

    /// Deterministic variant for tests.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(SmallRng::seed_from_u64(seed));
        self
    }
}

#[async_trait]
impl Handler for AbSplit {
    async fn handle(&self, ctx: &WorkerContext, subject: &str, body: &[u8]) -> HandlerResult {
        if draw(&self.rng, self.m) < self.n {
            self.a.handle(ctx, subject, body).await
        } else {
            self.b.handle(ctx, subject, body).await
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::handler::test_support::{reply_with, test_ctx};

    use super::*;

    #[tokio::test]
    async fn sample_half_produces_both_outcomes() {
        let sampled = Sample::new(reply_with("ok"), 1, 2, "talk to the hand").with_seed(3);
        let ctx = test_ctx();
        let mut errors = 0;
        for _ in 0..40 {
            if sampled.handle(&ctx, "t", b"").await.is_err() {
                errors += 1;
            }
        }
        assert!(errors > 0 && errors < 40, "errors = {errors}");
    }

    #[tokio::test]
    async fn sample_error_carries_the_message() {
        // n == m: always fails.
        let sampled = Sample::new(reply_with("ok"), 1, 1, "oops");
        let err = sampled.handle(&test_ctx(), "t", b"").await.unwrap_err();
        assert_eq!(err, HandlerError::msg("oops"));
    }

    #[tokio::test]
    async fn sample_zero_never_fails() {
        let sampled = Sample::new(reply_with("ok"), 0, 5, "never");
        for _ in 0..20 {
            assert!(sampled.handle(&test_ctx(), "t", b"").await.is_ok());
        }
    }

    #[tokio::test]
    async fn ab_split_reaches_both_sides() {
        let split = AbSplit::new(reply_with("a"), reply_with("b"), 1, 2).with_seed(9);
        let ctx = test_ctx();
        let mut seen_a = false;
        let mut seen_b = false;
        for _ in 0..40 {
            match split.handle(&ctx, "t", b"").await.unwrap().unwrap().as_ref() {
                b"a" => seen_a = true,
                b"b" => seen_b = true,
                other => panic!("unexpected reply {other:?}"),
            }
        }
        assert!(seen_a && seen_b);
    }

    #[tokio::test]
    async fn ab_split_all_to_a() {
        let split = AbSplit::new(reply_with("a"), reply_with("b"), 3, 3);
        for _ in 0..10 {
            let out = split.handle(&test_ctx(), "t", b"").await.unwrap().unwrap();
            assert_eq!(out.as_ref(), b"a");
        }
    }
}
