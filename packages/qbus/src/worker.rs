//! Worker bindings: one live subscription wired to a handler.
//!
//! Each binding runs a receive loop pulling from its subscription channel
//! and spawning one dispatch task per message, so handler invocations are
//! independently scheduled and never block the loop. Unsubscribing stops
//! new deliveries; dispatch tasks already spawned run to completion.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::config::WorkerOptions;
use crate::handler::{Handler, WorkerContext};
use crate::transport::{
    InboundMessage, Subscription, SubscriptionControl, Transport, TransportError,
};

/// Literal prefix marking an error reply on the wire, followed by the
/// handler's error message. Distinguishes failures from ordinary payloads
/// that happen to cross process boundaries.
pub const ERROR_REPLY_PREFIX: &str = "error:";

/// A subscription paired with its receive loop. Dropping the guard
/// unsubscribes; the loop then drains and exits on its own.
struct SubscriptionGuard {
    control: Arc<dyn SubscriptionControl>,
    _task: JoinHandle<()>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.control.unsubscribe();
    }
}

/// One live worker: a primary subscription on the topic (or queue group)
/// and, optionally, a private subscription on the worker's own id for
/// directed delivery to this specific replica.
pub(crate) struct WorkerBinding {
    pub id: String,
    pub topic: String,
    pub queue: Option<String>,
    pub handler: Arc<dyn Handler>,
    pub options: WorkerOptions,
    _primary: SubscriptionGuard,
    _private: Option<SubscriptionGuard>,
}

impl WorkerBinding {
    /// Subscribes and starts the receive loops. The binding is live as
    /// soon as this returns.
    pub(crate) async fn bind(
        session: &Arc<dyn Transport>,
        topic: &str,
        queue: Option<&str>,
        handler: Arc<dyn Handler>,
        options: WorkerOptions,
    ) -> Result<Self, TransportError> {
        let id = qbus_core::new_id();
        let ctx = WorkerContext {
            worker_id: id.clone(),
            topic: topic.to_string(),
            queue: queue.map(ToString::to_string),
        };

        let subscription = match queue {
            Some(q) => session.queue_subscribe(topic, q).await?,
            None => session.subscribe(topic).await?,
        };
        let primary = spawn_receive_loop(
            Arc::clone(session),
            subscription,
            Arc::clone(&handler),
            ctx.clone(),
            options.auto_unsubscribe,
        );

        let private = if options.private_subscription {
            let subscription = session.subscribe(&id).await?;
            Some(spawn_receive_loop(
                Arc::clone(session),
                subscription,
                Arc::clone(&handler),
                ctx,
                options.auto_unsubscribe,
            ))
        } else {
            None
        };

        tracing::debug!(topic, worker = %id, queue = ?queue, "worker bound");
        Ok(Self {
            id,
            topic: topic.to_string(),
            queue: queue.map(ToString::to_string),
            handler,
            options,
            _primary: primary,
            _private: private,
        })
    }
}

fn spawn_receive_loop(
    session: Arc<dyn Transport>,
    subscription: Subscription,
    handler: Arc<dyn Handler>,
    ctx: WorkerContext,
    limit: Option<u64>,
) -> SubscriptionGuard {
    let Subscription {
        control,
        mut messages,
    } = subscription;
    let loop_control = Arc::clone(&control);

    let task = tokio::spawn(async move {
        let mut received = 0u64;
        while let Some(message) = messages.recv().await {
            tokio::spawn(dispatch(
                Arc::clone(&session),
                Arc::clone(&handler),
                ctx.clone(),
                message,
            ));
            received += 1;
            if limit.is_some_and(|n| received >= n) {
                loop_control.unsubscribe();
                break;
            }
        }
    });

    SubscriptionGuard {
        control,
        _task: task,
    }
}

/// Processes one inbound message: invoke the handler, then publish its
/// outcome to the reply destination when there is one. A handler failure
/// becomes an error-marked reply, never a crash of the loop.
async fn dispatch(
    session: Arc<dyn Transport>,
    handler: Arc<dyn Handler>,
    ctx: WorkerContext,
    message: InboundMessage,
) {
    let result = handler.handle(&ctx, &message.subject, &message.payload).await;
    match (result, message.reply) {
        (Ok(Some(reply)), Some(destination)) => {
            if let Err(err) = session.publish(&destination, reply).await {
                tracing::warn!(%err, subject = %message.subject, "failed to publish reply");
            }
        }
        // No payload or no reply destination: fire-and-forget.
        (Ok(_), _) => {}
        (Err(handler_err), Some(destination)) => {
            let payload = Bytes::from(format!("{ERROR_REPLY_PREFIX}{handler_err}"));
            if let Err(err) = session.publish(&destination, payload).await {
                tracing::warn!(%err, subject = %message.subject, "failed to publish error reply");
            }
        }
        (Err(handler_err), None) => {
            tracing::debug!(
                %handler_err,
                subject = %message.subject,
                "handler failed with no reply destination"
            );
        }
    }
}
