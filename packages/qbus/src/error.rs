//! Error taxonomy for registry and client operations.

use std::time::Duration;

use crate::transport::TransportError;

/// Errors returned by registry and client operations.
///
/// All of these are ordinary, recoverable conditions: nothing here panics
/// or retries on its own — retry policy belongs to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A topic or queue name fails the naming grammar.
    #[error("'{0}' is not a valid name")]
    InvalidName(String),
    /// A worker entry already exists for this exact topic string.
    #[error("server '{0}' already exists")]
    AlreadyBound(String),
    /// Scale/close addressed a topic with no entry.
    #[error("server '{0}' was not found")]
    NotFound(String),
    /// An options snapshot failed validation at worker-creation time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The transport session could not be opened or was lost.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(#[source] TransportError),
    /// No reply arrived within the caller's deadline. Retryable.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),
    /// A remote handler reported failure, carried back over the wire as an
    /// error-marked reply.
    #[error("handler error: {0}")]
    Handler(String),
}

pub type Result<T> = std::result::Result<T, Error>;
