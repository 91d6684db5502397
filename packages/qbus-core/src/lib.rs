//! qbus core — envelope codec, naming grammar, and identity provider.
//!
//! This crate holds the pure, runtime-free pieces shared by producers and
//! consumers: the header-block-plus-body envelope format, the topic naming
//! grammar (with `*`/`>` wildcards for server names), and opaque unique
//! identifiers for application instances, traces, and workers.

pub mod envelope;
pub mod identity;
pub mod names;

pub use envelope::{decode, encode, Header, APP_ID, APP_NAME, TRACE_ID};
pub use identity::{new_id, AppIdentity};
pub use names::{is_valid_publication_name, is_valid_server_name};
