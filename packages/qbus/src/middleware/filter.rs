//! Filtering: conditionally skip the wrapped handler.

use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::{Handler, HandlerResult, WorkerContext};

/// Invokes the wrapped handler only when the predicate accepts the
/// message; otherwise yields `Ok(None)` — a silent skip, not an error.
pub struct Filter {
    inner: Arc<dyn Handler>,
    predicate: Box<dyn Fn(&WorkerContext, &str, &[u8]) -> bool + Send + Sync>,
}

impl Filter {
    pub fn new<P>(inner: Arc<dyn Handler>, predicate: P) -> Self
    where
        P: Fn(&WorkerContext, &str, &[u8]) -> bool + Send + Sync + 'static,
    {
        Self {
            inner,
            predicate: Box::new(predicate),
        }
    }
}

#[async_trait]
impl Handler for Filter {
    async fn handle(&self, ctx: &WorkerContext, subject: &str, body: &[u8]) -> HandlerResult {
        if (self.predicate)(ctx, subject, body) {
            self.inner.handle(ctx, subject, body).await
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::handler::test_support::{reply_with, test_ctx};

    use super::*;

    #[tokio::test]
    async fn accepted_messages_reach_the_handler() {
        let h = Filter::new(reply_with("yes"), |_, _, body| body.starts_with(b"ok"));
        let out = h.handle(&test_ctx(), "t", b"ok go").await.unwrap().unwrap();
        assert_eq!(out.as_ref(), b"yes");
    }

    #[tokio::test]
    async fn rejected_messages_are_skipped_without_error() {
        let h = Filter::new(reply_with("yes"), |_, _, body| body.starts_with(b"ok"));
        assert_eq!(h.handle(&test_ctx(), "t", b"nope").await, Ok(None));
    }

    #[tokio::test]
    async fn predicate_sees_the_subject() {
        let h = Filter::new(reply_with("yes"), |_, subject, _| subject.ends_with(".eu"));
        assert_eq!(h.handle(&test_ctx(), "orders.us", b"").await, Ok(None));
        assert!(h
            .handle(&test_ctx(), "orders.eu", b"")
            .await
            .unwrap()
            .is_some());
    }
}
