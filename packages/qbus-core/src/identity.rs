//! Opaque unique identifiers and per-instance application identity.

use uuid::Uuid;

/// Returns a new globally-unique opaque identifier.
///
/// Used for application instance ids, trace ids, and worker ids. The `q`
/// prefix keeps ids valid under the naming grammar so a worker id can be
/// used directly as a private subscription subject.
#[must_use]
pub fn new_id() -> String {
    format!("q{}", Uuid::new_v4().simple())
}

/// Identity of one running application instance.
///
/// Owned by whoever needs it (typically a registry) rather than stored as a
/// process global, so independent instances in one process — tests in
/// particular — never share identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    /// Unique id of this instance, fresh per construction.
    pub id: String,
    /// Display name, stamped into the `appName` envelope header.
    pub name: String,
}

impl AppIdentity {
    /// Creates an identity named after the current executable's file stem.
    #[must_use]
    pub fn detect() -> Self {
        let name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "qbus".to_string());
        Self::named(name)
    }

    /// Creates an identity with an explicit display name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
        }
    }
}
