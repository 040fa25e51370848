use anyhow::Result;
use async_trait::async_trait;

use crate::types::RoundEvent;

/// Outbound notification channel (webhook, social publisher bridge, etc.).
///
/// Publishing is best-effort: callers discard errors.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Human-readable notifier name for logging.
    fn name(&self) -> &'static str;

    /// Publish a single event.
    async fn publish(&self, event: &RoundEvent) -> Result<()>;
}
