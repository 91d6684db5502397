//! Worker configuration snapshots.

use std::time::Duration;

/// Resolved options captured at worker-creation time.
///
/// A registry holds a default snapshot; a per-call override is an owned
/// copy, so overriding never mutates the defaults. The snapshot stored on a
/// binding is what scale-up clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Transport endpoint handed to the connector.
    pub url: String,
    /// Client display name reported to the transport.
    pub client_name: String,
    /// Maximum time to wait when establishing the transport session.
    pub connect_timeout: Duration,
    /// Whether each worker also subscribes on its own unique id, allowing
    /// callers to address one specific replica directly.
    pub private_subscription: bool,
    /// Number of bindings created up front. Must be at least 1.
    pub initial_scale: usize,
    /// If set, a binding stops receiving after this many messages.
    pub auto_unsubscribe: Option<u64>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            client_name: "qbus".to_string(),
            connect_timeout: Duration::from_millis(100),
            private_subscription: true,
            initial_scale: 1,
            auto_unsubscribe: None,
        }
    }
}

impl WorkerOptions {
    /// Sets the transport endpoint.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the client display name.
    #[must_use]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Disables the per-worker private subscription.
    #[must_use]
    pub fn no_private_subscription(mut self) -> Self {
        self.private_subscription = false;
        self
    }

    /// Sets the initial number of bindings. Validated at creation time;
    /// zero is rejected there with `Error::InvalidConfig`.
    #[must_use]
    pub fn initial_scale(mut self, n: usize) -> Self {
        self.initial_scale = n;
        self
    }

    /// Stops each binding after `n` received messages.
    #[must_use]
    pub fn auto_unsubscribe(mut self, n: u64) -> Self {
        self.auto_unsubscribe = Some(n);
        self
    }
}
