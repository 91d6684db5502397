//! The handler model: what a worker invokes per inbound message.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

/// Failure reported by a handler.
///
/// Handler errors are remote-facing: dispatch converts them into an
/// error-marked reply on the wire, they never crash the worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Message(String),
    /// A routing selector produced an index outside its candidate range.
    #[error("selected handler {index} was not in the range [0..{count})")]
    SelectionOutOfRange { index: usize, count: usize },
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Outcome of one handler invocation. `Ok(None)` means "no reply":
/// a deliberate silent drop, distinct from both success-with-payload and
/// failure.
pub type HandlerResult = Result<Option<Bytes>, HandlerError>;

/// What a handler may learn about the worker binding serving it.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Unique id of the binding, also its private subscription subject.
    pub worker_id: String,
    /// Topic the binding was created on (may contain wildcards).
    pub topic: String,
    /// Queue group, when the binding load-shares.
    pub queue: Option<String>,
}

/// Request-processing logic bound to a worker.
///
/// Handlers run concurrently, one invocation per inbound message, outside
/// the registry lock; they must not assume anything about the topic's
/// replica count. Composition wrappers in [`crate::middleware`] are
/// themselves handlers wrapping inner ones.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Processes one message published on `subject` (a concrete name, even
    /// when `ctx.topic` is a wildcard pattern).
    async fn handle(&self, ctx: &WorkerContext, subject: &str, body: &[u8]) -> HandlerResult;
}

/// Lifts a plain closure into a [`Handler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: Fn(&WorkerContext, &str, &[u8]) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&WorkerContext, &str, &[u8]) -> HandlerResult + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &WorkerContext, subject: &str, body: &[u8]) -> HandlerResult {
        (self.0)(ctx, subject, body)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn test_ctx() -> WorkerContext {
        WorkerContext {
            worker_id: qbus_core::new_id(),
            topic: "test".to_string(),
            queue: None,
        }
    }

    /// Always replies with the given literal.
    pub fn reply_with(text: &'static str) -> Arc<dyn Handler> {
        handler_fn(move |_, _, _| Ok(Some(Bytes::from_static(text.as_bytes()))))
    }

    /// Always fails with the given message.
    pub fn fail_with(text: &'static str) -> Arc<dyn Handler> {
        handler_fn(move |_, _, _| Err(HandlerError::msg(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_ctx;
    use super::*;

    #[tokio::test]
    async fn closure_handler_sees_its_arguments() {
        let h = handler_fn(|ctx, subject, body| {
            assert_eq!(subject, "t.a");
            assert_eq!(body, b"in");
            Ok(Some(Bytes::from(format!("from {}", ctx.worker_id))))
        });
        let ctx = test_ctx();
        let out = h.handle(&ctx, "t.a", b"in").await.unwrap().unwrap();
        assert_eq!(out, Bytes::from(format!("from {}", ctx.worker_id)));
    }

    #[tokio::test]
    async fn none_result_is_not_an_error() {
        let h = handler_fn(|_, _, _| Ok(None));
        assert_eq!(h.handle(&test_ctx(), "t", b"").await, Ok(None));
    }
}
