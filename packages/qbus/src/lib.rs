//! qbus — topic-addressed request/reply over a pub/sub transport.
//!
//! The two load-bearing pieces:
//!
//! 1. **Worker registry** (`registry`): tracks, scales, and tears down
//!    groups of subscription-bound workers per logical topic, owning the
//!    lazily opened transport session they share.
//! 2. **Handler composition** (`middleware`): routing, sampling, A/B
//!    splits, fallback, and filtering as nestable wrappers around a base
//!    [`Handler`] — the registry binds whatever it is given and knows
//!    nothing about the wrapping.
//!
//! Everything else is deliberately thin: the envelope codec and naming
//! grammar live in `qbus-core`, and the transport is reached through the
//! [`Connector`]/[`Transport`] seam (an in-process [`MemoryBus`] ships
//! with the crate).

pub mod config;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod registry;
pub mod transport;
pub mod worker;

// Re-export key types for convenient access.
pub use config::WorkerOptions;
pub use error::{Error, Result};
pub use handler::{handler_fn, Handler, HandlerError, HandlerResult, WorkerContext};
pub use qbus_core::{
    decode, encode, is_valid_publication_name, is_valid_server_name, new_id, AppIdentity, Header,
};
pub use registry::{Registry, WorkerHandle};
pub use transport::{Connector, MemoryBus, Transport};
pub use worker::ERROR_REPLY_PREFIX;
