//! Routing: select one of several handlers per message.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::handler::{Handler, HandlerError, HandlerResult, WorkerContext};

/// Chooses which of `count` candidate handlers serves a message.
pub trait Selector: Send + Sync {
    /// Returns an index that must lie in `[0, count)`; anything else makes
    /// the route fail with `SelectionOutOfRange`.
    fn select(&self, count: usize, ctx: &WorkerContext, subject: &str, body: &[u8]) -> usize;
}

/// Uniformly random selector, the default for A/B and canary routing.
pub struct RandomSelection {
    rng: Mutex<SmallRng>,
}

impl RandomSelection {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_os_rng()),
        }
    }

    /// Deterministic variant for tests.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for RandomSelection {
    fn select(&self, count: usize, _ctx: &WorkerContext, _subject: &str, _body: &[u8]) -> usize {
        if count == 0 {
            return 0;
        }
        self.rng.lock().random_range(0..count)
    }
}

/// Routes each message to one of several handler slots.
///
/// A `None` slot is a deliberate sink: selecting it yields `Ok(None)`, so
/// the message is silently dropped rather than failed.
pub struct Route {
    selector: Box<dyn Selector>,
    slots: Vec<Option<Arc<dyn Handler>>>,
}

impl Route {
    pub fn new(selector: impl Selector + 'static, slots: Vec<Option<Arc<dyn Handler>>>) -> Self {
        Self {
            selector: Box::new(selector),
            slots,
        }
    }

    /// Convenience constructor when every slot has a handler.
    pub fn across(selector: impl Selector + 'static, handlers: Vec<Arc<dyn Handler>>) -> Self {
        Self::new(selector, handlers.into_iter().map(Some).collect())
    }
}

#[async_trait]
impl Handler for Route {
    async fn handle(&self, ctx: &WorkerContext, subject: &str, body: &[u8]) -> HandlerResult {
        let count = self.slots.len();
        let index = self.selector.select(count, ctx, subject, body);
        let Some(slot) = self.slots.get(index) else {
            return Err(HandlerError::SelectionOutOfRange { index, count });
        };
        match slot {
            Some(handler) => handler.handle(ctx, subject, body).await,
            None => Ok(None),
        }
    }
}
