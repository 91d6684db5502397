//! The worker registry: topic → bindings bookkeeping, scaling, lifecycle,
//! and the publish/request client surface.
//!
//! A [`Registry`] is an owned instance over an injected [`Connector`];
//! independent registries (one per test, typically) never share state. All
//! structural operations — create, scale, close — run under one async
//! mutex, so entry changes are atomic with respect to concurrent registry
//! calls and concurrent dispatch. Handler invocations happen on spawned
//! tasks outside that lock.
//!
//! The transport session is opened lazily on first use and closed when the
//! last entry disappears (or on [`Registry::close_all`]).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use qbus_core::{encode, is_valid_publication_name, is_valid_server_name, AppIdentity, Header};
use tokio::sync::Mutex;

use crate::config::WorkerOptions;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::transport::{Connector, Transport, TransportError};
use crate::worker::{WorkerBinding, ERROR_REPLY_PREFIX};

struct State {
    session: Option<Arc<dyn Transport>>,
    entries: HashMap<String, Vec<WorkerBinding>>,
}

/// Tracks, scales, and tears down groups of workers bound to logical
/// topics, and owns the (lazily opened) transport session they share.
pub struct Registry {
    connector: Arc<dyn Connector>,
    identity: AppIdentity,
    defaults: WorkerOptions,
    state: Mutex<State>,
}

impl Registry {
    /// Creates an empty registry over `connector` with default options and
    /// a detected application identity.
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
            identity: AppIdentity::detect(),
            defaults: WorkerOptions::default(),
            state: Mutex::new(State {
                session: None,
                entries: HashMap::new(),
            }),
        }
    }

    /// Replaces the default options snapshot used when a call passes none.
    #[must_use]
    pub fn with_defaults(mut self, defaults: WorkerOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Replaces the application identity stamped into outgoing envelopes.
    #[must_use]
    pub fn with_identity(mut self, identity: AppIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    // -----------------------------------------------------------------
    // Worker creation
    // -----------------------------------------------------------------

    /// Creates a fan-out worker group on `topic`.
    ///
    /// Every binding receives every matching message. With
    /// `initial_scale > 1` the extra bindings are clones of the first.
    ///
    /// # Errors
    ///
    /// `InvalidName` if `topic` fails the server-name grammar,
    /// `AlreadyBound` if an entry already exists for this exact string,
    /// `InvalidConfig` for a zero initial scale, `TransportUnavailable` if
    /// the session cannot be opened.
    pub async fn create_topic_worker(
        self: &Arc<Self>,
        topic: &str,
        handler: Arc<dyn Handler>,
        options: Option<WorkerOptions>,
    ) -> Result<WorkerHandle> {
        self.create_worker(topic, None, handler, options).await
    }

    /// Creates a load-shared worker group: all bindings join `queue`, so
    /// each matching message goes to exactly one of them.
    ///
    /// # Errors
    ///
    /// As [`Registry::create_topic_worker`]; additionally `InvalidName` if
    /// `queue` fails the publication-name grammar.
    pub async fn create_queue_worker(
        self: &Arc<Self>,
        topic: &str,
        queue: &str,
        handler: Arc<dyn Handler>,
        options: Option<WorkerOptions>,
    ) -> Result<WorkerHandle> {
        if !is_valid_publication_name(queue) {
            return Err(Error::InvalidName(queue.to_string()));
        }
        self.create_worker(topic, Some(queue), handler, options).await
    }

    async fn create_worker(
        self: &Arc<Self>,
        topic: &str,
        queue: Option<&str>,
        handler: Arc<dyn Handler>,
        options: Option<WorkerOptions>,
    ) -> Result<WorkerHandle> {
        if !is_valid_server_name(topic) {
            return Err(Error::InvalidName(topic.to_string()));
        }
        let options = options.unwrap_or_else(|| self.defaults.clone());
        if options.initial_scale == 0 {
            return Err(Error::InvalidConfig(
                "initial_scale must be at least 1".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        if state.entries.contains_key(topic) {
            return Err(Error::AlreadyBound(topic.to_string()));
        }
        let session = Self::ensure_session(&self.connector, &mut state, &options).await?;

        let binding =
            WorkerBinding::bind(&session, topic, queue, handler, options.clone())
                .await
                .map_err(Error::TransportUnavailable)?;
        let worker_id = binding.id.clone();
        state.entries.insert(topic.to_string(), vec![binding]);

        if options.initial_scale > 1 {
            Self::scale_up_locked(&mut state, topic, options.initial_scale - 1).await?;
        }
        tracing::debug!(topic, scale = options.initial_scale, "worker group created");

        Ok(WorkerHandle {
            registry: Arc::clone(self),
            topic: topic.to_string(),
            worker_id,
        })
    }

    async fn ensure_session(
        connector: &Arc<dyn Connector>,
        state: &mut State,
        options: &WorkerOptions,
    ) -> Result<Arc<dyn Transport>> {
        if let Some(session) = &state.session {
            return Ok(Arc::clone(session));
        }
        let session = connector
            .connect(options)
            .await
            .map_err(Error::TransportUnavailable)?;
        state.session = Some(Arc::clone(&session));
        tracing::debug!(url = %options.url, "transport session opened");
        Ok(session)
    }

    // -----------------------------------------------------------------
    // Scaling and lifecycle
    // -----------------------------------------------------------------

    /// Scales the worker group on `topic` by `delta`.
    ///
    /// Positive deltas clone the group's first binding (handler, queue,
    /// options all inherited); negative deltas remove bindings from the
    /// end, unsubscribing each. Emptying the group removes its entry, and
    /// removing the last entry closes the transport session. A zero delta
    /// is a no-op, never an error.
    ///
    /// # Errors
    ///
    /// `NotFound` if `topic` has no entry (for any non-zero delta).
    pub async fn scale(&self, topic: &str, delta: i64) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        if delta > 0 {
            Self::scale_up_locked(&mut state, topic, usize::try_from(delta).unwrap_or(0)).await
        } else {
            let n = usize::try_from(delta.unsigned_abs()).unwrap_or(usize::MAX);
            Self::scale_down_locked(&mut state, topic, n).await
        }
    }

    async fn scale_up_locked(state: &mut State, topic: &str, n: usize) -> Result<()> {
        let (queue, handler, options) = match state.entries.get(topic) {
            Some(bindings) if !bindings.is_empty() => {
                let first = &bindings[0];
                (
                    first.queue.clone(),
                    Arc::clone(&first.handler),
                    first.options.clone(),
                )
            }
            _ => return Err(Error::NotFound(topic.to_string())),
        };
        let session = state
            .session
            .clone()
            .ok_or(Error::TransportUnavailable(TransportError::Closed))?;

        let mut fresh = Vec::with_capacity(n);
        for _ in 0..n {
            let binding = WorkerBinding::bind(
                &session,
                topic,
                queue.as_deref(),
                Arc::clone(&handler),
                options.clone(),
            )
            .await
            .map_err(Error::TransportUnavailable)?;
            fresh.push(binding);
        }
        if let Some(bindings) = state.entries.get_mut(topic) {
            bindings.append(&mut fresh);
        }
        Ok(())
    }

    async fn scale_down_locked(state: &mut State, topic: &str, n: usize) -> Result<()> {
        let Some(bindings) = state.entries.get_mut(topic) else {
            return Err(Error::NotFound(topic.to_string()));
        };
        for _ in 0..n {
            // Dropping a binding unsubscribes its primary and private
            // subscriptions; in-flight dispatch tasks run to completion.
            match bindings.pop() {
                Some(binding) => {
                    tracing::debug!(topic = %binding.topic, worker = %binding.id, "worker unbound");
                    drop(binding);
                }
                None => break,
            }
        }
        if bindings.is_empty() {
            state.entries.remove(topic);
            tracing::debug!(topic, "worker group removed");
        }
        if state.entries.is_empty() {
            Self::close_session(state).await;
        }
        Ok(())
    }

    async fn close_session(state: &mut State) {
        if let Some(session) = state.session.take() {
            let _ = session.flush().await;
            let _ = session.close().await;
            tracing::debug!("transport session closed");
        }
    }

    /// Number of live bindings for `topic`; zero when absent.
    pub async fn count(&self, topic: &str) -> usize {
        self.state.lock().await.entries.get(topic).map_or(0, Vec::len)
    }

    /// Closes the worker group on `topic` entirely (scale down to zero).
    ///
    /// # Errors
    ///
    /// `NotFound` if other groups exist but `topic` has no entry.
    pub async fn close(&self, topic: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.entries.is_empty() {
            Self::close_session(&mut state).await;
            return Ok(());
        }
        let n = state.entries.get(topic).map_or(0, Vec::len);
        Self::scale_down_locked(&mut state, topic, n).await
    }

    /// Closes every worker group, then the transport session — even if
    /// the registry was already empty.
    pub async fn close_all(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let topics: Vec<String> = state.entries.keys().cloned().collect();
        for topic in topics {
            let n = state.entries.get(&topic).map_or(0, Vec::len);
            Self::scale_down_locked(&mut state, &topic, n).await?;
        }
        Self::close_session(&mut state).await;
        Ok(())
    }

    /// True once a transport session is open.
    pub async fn is_open(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    /// True when `topic` has no entry, so a create would not collide.
    pub async fn is_available(&self, topic: &str) -> bool {
        !self.state.lock().await.entries.contains_key(topic)
    }

    // -----------------------------------------------------------------
    // Client surface
    // -----------------------------------------------------------------

    /// Publishes an enveloped message to `server_name`, fire-and-forget.
    ///
    /// A missing or empty `trace_id` gets a fresh generated one. Opens the
    /// transport session if needed.
    ///
    /// # Errors
    ///
    /// `InvalidName` for a name outside the publication grammar,
    /// `TransportUnavailable` if the session cannot be opened or the
    /// publish fails.
    pub async fn publish(
        &self,
        trace_id: Option<&str>,
        server_name: &str,
        body: &[u8],
        headers: &[Header],
    ) -> Result<()> {
        let session = self.checked_session(server_name).await?;
        let message = self.envelope(trace_id, headers, body);
        session
            .publish(server_name, message)
            .await
            .map_err(Error::TransportUnavailable)
    }

    /// Sends an enveloped request to `server_name` and blocks for the
    /// reply, up to `timeout`.
    ///
    /// # Errors
    ///
    /// As [`Registry::publish`], plus `RequestTimeout` when no reply
    /// arrives in time and `Handler` when the reply is error-marked
    /// (`error:<message>`) because the remote handler failed.
    pub async fn request(
        &self,
        trace_id: Option<&str>,
        server_name: &str,
        body: &[u8],
        timeout: Duration,
        headers: &[Header],
    ) -> Result<Bytes> {
        let session = self.checked_session(server_name).await?;
        let message = self.envelope(trace_id, headers, body);
        let reply = session
            .request(server_name, message, timeout)
            .await
            .map_err(|err| match err {
                TransportError::Timeout => Error::RequestTimeout(timeout),
                other => Error::TransportUnavailable(other),
            })?;
        if let Some(rest) = reply.strip_prefix(ERROR_REPLY_PREFIX.as_bytes()) {
            return Err(Error::Handler(
                String::from_utf8_lossy(rest).into_owned(),
            ));
        }
        Ok(reply)
    }

    async fn checked_session(&self, server_name: &str) -> Result<Arc<dyn Transport>> {
        if !is_valid_publication_name(server_name) {
            return Err(Error::InvalidName(server_name.to_string()));
        }
        let mut state = self.state.lock().await;
        Self::ensure_session(&self.connector, &mut state, &self.defaults).await
    }

    fn envelope(&self, trace_id: Option<&str>, headers: &[Header], body: &[u8]) -> Bytes {
        let generated;
        let trace = match trace_id {
            Some(t) if !t.is_empty() => t,
            _ => {
                generated = qbus_core::new_id();
                &generated
            }
        };
        encode(trace, &self.identity.id, &self.identity.name, headers, body)
    }
}

/// Handle to one worker group, scoped to its topic.
///
/// All operations delegate to the owning registry, so a handle and direct
/// registry calls may be mixed freely.
pub struct WorkerHandle {
    registry: Arc<Registry>,
    topic: String,
    worker_id: String,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("topic", &self.topic)
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

impl WorkerHandle {
    /// Unique id of the first binding created for this group (also its
    /// private subscription subject).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.worker_id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Scales this group by `delta`. See [`Registry::scale`].
    ///
    /// # Errors
    ///
    /// `NotFound` if the group has already been closed.
    pub async fn scale(&self, delta: i64) -> Result<()> {
        self.registry.scale(&self.topic, delta).await
    }

    /// Live binding count for this group.
    pub async fn count(&self) -> usize {
        self.registry.count(&self.topic).await
    }

    /// Closes the whole group. See [`Registry::close`].
    ///
    /// # Errors
    ///
    /// `NotFound` if other groups exist but this one is already gone.
    pub async fn close(&self) -> Result<()> {
        self.registry.close(&self.topic).await
    }
}
