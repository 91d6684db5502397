//! Transport session abstraction.
//!
//! The registry talks to its messaging transport through two seams:
//! [`Connector`], which lazily opens a session, and [`Transport`], one live
//! session providing publish, subscribe, queue-subscribe, and synchronous
//! request primitives. Nothing here assumes delivery guarantees beyond
//! "subscribed channels receive matching published messages, and
//! request/reply correlates a single reply".
//!
//! The crate ships one implementation, the in-process [`MemoryBus`]; real
//! brokers plug in behind the same traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::WorkerOptions;

pub mod memory;

pub use memory::MemoryBus;

/// Errors surfaced by transport implementations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The session could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The session has been closed; no further operations are possible.
    #[error("transport session is closed")]
    Closed,
    /// No reply arrived before the request deadline.
    #[error("no reply before the deadline")]
    Timeout,
}

/// One message delivered to a subscription.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Concrete subject the message was published on (never a wildcard).
    pub subject: String,
    /// Reply destination, when the publisher expects a response.
    pub reply: Option<String>,
    pub payload: Bytes,
}

/// Control half of a subscription, separable from the message stream so the
/// owner can cancel while a receive loop holds the receiver.
pub trait SubscriptionControl: Send + Sync {
    /// Stops delivery. Idempotent. Messages already queued on the channel
    /// may still be consumed; no new ones arrive afterwards.
    fn unsubscribe(&self);
}

/// A live subscription: its message stream plus its cancel handle.
pub struct Subscription {
    pub control: Arc<dyn SubscriptionControl>,
    pub messages: mpsc::Receiver<InboundMessage>,
}

/// One connection to the messaging transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes `payload` on `subject` with no reply expectation.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Subscribes to every message matching `subject` (fan-out).
    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError>;

    /// Joins the named queue group on `subject`; each matching message goes
    /// to exactly one group member.
    async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
    ) -> Result<Subscription, TransportError>;

    /// Publishes and blocks for a single correlated reply, up to `timeout`.
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, TransportError>;

    /// Drains any buffered outbound work.
    async fn flush(&self) -> Result<(), TransportError>;

    /// Closes the session and cancels its subscriptions.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Factory seam for opening transport sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens one session. The registry guarantees it calls this at most
    /// once per live session, under its state lock.
    async fn connect(
        &self,
        options: &WorkerOptions,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}
