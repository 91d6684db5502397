//! In-process loopback transport.
//!
//! A [`MemoryBus`] is a shared subject space; each [`Connector::connect`]
//! call yields a session on the same bus. Delivery follows the usual
//! subject grammar: `*` matches one dot-separated token, a trailing `>`
//! matches one or more remaining tokens. Plain subscriptions fan out; queue
//! subscriptions deliver each message to one randomly chosen group member.
//!
//! Channels are bounded; a subscriber that falls behind has messages
//! dropped with a warning rather than blocking the publisher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;

use super::{
    Connector, InboundMessage, Subscription, SubscriptionControl, Transport, TransportError,
};
use crate::config::WorkerOptions;

/// Per-subscription channel capacity. Bounded so a slow consumer drops
/// messages instead of buffering without limit.
const CHANNEL_CAPACITY: usize = 256;

/// Returns true when a subscription `pattern` matches a concrete `subject`.
pub(crate) fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            // '>' consumes one or more remaining tokens.
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

struct SubEntry {
    pattern: String,
    queue: Option<String>,
    tx: mpsc::Sender<InboundMessage>,
}

struct BusState {
    next_id: AtomicU64,
    subscriptions: DashMap<u64, SubEntry>,
}

/// Shared in-process subject space. Cloning yields another handle to the
/// same bus; use one per test for isolation.
#[derive(Clone)]
pub struct MemoryBus {
    state: Arc<BusState>,
}

impl MemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(BusState {
                next_id: AtomicU64::new(0),
                subscriptions: DashMap::new(),
            }),
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryBus {
    async fn connect(
        &self,
        _options: &WorkerOptions,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(Arc::new(MemorySession {
            bus: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
            owned: parking_lot::Mutex::new(Vec::new()),
        }))
    }
}

impl BusState {
    fn deliver(&self, subject: &str, reply: Option<&str>, payload: &Bytes) {
        let make_message = || InboundMessage {
            subject: subject.to_string(),
            reply: reply.map(ToString::to_string),
            payload: payload.clone(),
        };

        // Queue groups get one randomly chosen member each; plain
        // subscriptions all get a copy.
        let mut groups: HashMap<String, Vec<mpsc::Sender<InboundMessage>>> = HashMap::new();
        for entry in self.subscriptions.iter() {
            if !subject_matches(&entry.pattern, subject) {
                continue;
            }
            match &entry.queue {
                Some(queue) => groups
                    .entry(queue.clone())
                    .or_default()
                    .push(entry.tx.clone()),
                None => send_or_drop(&entry.tx, make_message(), subject),
            }
        }
        for members in groups.values() {
            let pick = rand::rng().random_range(0..members.len());
            send_or_drop(&members[pick], make_message(), subject);
        }
    }

    fn remove(&self, id: u64) {
        // Dropping the sender closes the channel once drained.
        self.subscriptions.remove(&id);
    }
}

fn send_or_drop(tx: &mpsc::Sender<InboundMessage>, msg: InboundMessage, subject: &str) {
    if let Err(err) = tx.try_send(msg) {
        match err {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(subject, "subscriber channel full, dropping message");
            }
            // Receiver already gone; unsubscribe is racing us.
            mpsc::error::TrySendError::Closed(_) => {}
        }
    }
}

struct MemorySession {
    bus: Arc<BusState>,
    closed: AtomicBool,
    /// Ids of subscriptions opened through this session, cancelled on close.
    owned: parking_lot::Mutex<Vec<u64>>,
}

struct MemorySubscriptionControl {
    bus: Arc<BusState>,
    id: u64,
}

impl SubscriptionControl for MemorySubscriptionControl {
    fn unsubscribe(&self) {
        self.bus.remove(self.id);
    }
}

impl MemorySession {
    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn add_subscription(
        &self,
        pattern: &str,
        queue: Option<&str>,
    ) -> Result<Subscription, TransportError> {
        self.check_open()?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let id = self.bus.next_id.fetch_add(1, Ordering::Relaxed);
        self.bus.subscriptions.insert(
            id,
            SubEntry {
                pattern: pattern.to_string(),
                queue: queue.map(ToString::to_string),
                tx,
            },
        );
        self.owned.lock().push(id);
        Ok(Subscription {
            control: Arc::new(MemorySubscriptionControl {
                bus: Arc::clone(&self.bus),
                id,
            }),
            messages: rx,
        })
    }
}

#[async_trait]
impl Transport for MemorySession {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        self.check_open()?;
        self.bus.deliver(subject, None, &payload);
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
        self.add_subscription(subject, None)
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
    ) -> Result<Subscription, TransportError> {
        self.add_subscription(subject, Some(queue))
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        self.check_open()?;
        let inbox = format!("_INBOX.{}", qbus_core::new_id());
        let mut sub = self.add_subscription(&inbox, None)?;
        self.bus.deliver(subject, Some(&inbox), &payload);

        let outcome = tokio::time::timeout(timeout, sub.messages.recv()).await;
        sub.control.unsubscribe();
        match outcome {
            Ok(Some(reply)) => Ok(reply.payload),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn flush(&self) -> Result<(), TransportError> {
        // Delivery is synchronous; there is nothing buffered to drain.
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        for id in self.owned.lock().drain(..) {
            self.bus.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_matching() {
        assert!(subject_matches("a.b", "a.b"));
        assert!(!subject_matches("a.b", "a.c"));
        assert!(!subject_matches("a.b", "a"));
        assert!(subject_matches("a.*", "a.b"));
        assert!(!subject_matches("a.*", "a.b.c"));
        assert!(subject_matches("a.>", "a.b"));
        assert!(subject_matches("a.>", "a.b.c.d"));
        assert!(!subject_matches("a.>", "a"));
        assert!(subject_matches(">", "anything.at.all"));
        assert!(!subject_matches("a.b.c", "a.b"));
    }

    async fn session(bus: &MemoryBus) -> Arc<dyn Transport> {
        bus.connect(&WorkerOptions::default()).await.unwrap()
    }

    #[tokio::test]
    async fn fan_out_to_all_plain_subscribers() {
        let bus = MemoryBus::new();
        let s = session(&bus).await;
        let mut a = s.subscribe("t.x").await.unwrap();
        let mut b = s.subscribe("t.*").await.unwrap();

        s.publish("t.x", Bytes::from_static(b"hi")).await.unwrap();

        assert_eq!(a.messages.recv().await.unwrap().payload.as_ref(), b"hi");
        let got = b.messages.recv().await.unwrap();
        assert_eq!(got.subject, "t.x");
        assert!(got.reply.is_none());
    }

    #[tokio::test]
    async fn queue_group_delivers_to_exactly_one_member() {
        let bus = MemoryBus::new();
        let s = session(&bus).await;
        let mut a = s.queue_subscribe("t", "g").await.unwrap();
        let mut b = s.queue_subscribe("t", "g").await.unwrap();

        for _ in 0..10 {
            s.publish("t", Bytes::from_static(b"m")).await.unwrap();
        }
        tokio::task::yield_now().await;

        let mut total = 0;
        while a.messages.try_recv().is_ok() {
            total += 1;
        }
        while b.messages.try_recv().is_ok() {
            total += 1;
        }
        assert_eq!(total, 10);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = MemoryBus::new();
        let s = session(&bus).await;
        let mut sub = s.subscribe("t").await.unwrap();

        s.publish("t", Bytes::from_static(b"1")).await.unwrap();
        sub.control.unsubscribe();
        s.publish("t", Bytes::from_static(b"2")).await.unwrap();

        // The pre-unsubscribe message is still consumable, then the
        // channel ends.
        assert_eq!(sub.messages.recv().await.unwrap().payload.as_ref(), b"1");
        assert!(sub.messages.recv().await.is_none());
    }

    #[tokio::test]
    async fn request_times_out_without_a_responder() {
        let bus = MemoryBus::new();
        let s = session(&bus).await;
        let err = s
            .request("nobody", Bytes::new(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }

    #[tokio::test]
    async fn request_reply_round_trip() {
        let bus = MemoryBus::new();
        let s = session(&bus).await;
        let mut sub = s.subscribe("echo").await.unwrap();

        let responder = {
            let s = Arc::clone(&s);
            tokio::spawn(async move {
                let msg = sub.messages.recv().await.unwrap();
                let reply = msg.reply.unwrap();
                s.publish(&reply, msg.payload).await.unwrap();
            })
        };

        let reply = s
            .request("echo", Bytes::from_static(b"ping"), Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(reply.as_ref(), b"ping");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn closed_session_rejects_operations() {
        let bus = MemoryBus::new();
        let s = session(&bus).await;
        s.close().await.unwrap();
        let err = s.publish("t", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(s.subscribe("t").await.is_err());
    }
}
