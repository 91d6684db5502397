//! Fallback: swap in a secondary handler when the primary fails.

use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::{Handler, HandlerResult, WorkerContext};

/// Invokes `primary`; on error, discards that error and invokes
/// `secondary`, whose outcome — success or its own error — is final.
pub struct Fallback {
    primary: Arc<dyn Handler>,
    secondary: Arc<dyn Handler>,
}

impl Fallback {
    pub fn new(primary: Arc<dyn Handler>, secondary: Arc<dyn Handler>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl Handler for Fallback {
    async fn handle(&self, ctx: &WorkerContext, subject: &str, body: &[u8]) -> HandlerResult {
        match self.primary.handle(ctx, subject, body).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                tracing::debug!(%err, subject, "primary handler failed, invoking fallback");
                self.secondary.handle(ctx, subject, body).await
            }
        }
    }
}
