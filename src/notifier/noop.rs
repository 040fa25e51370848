use anyhow::Result;
use async_trait::async_trait;

use crate::traits::Notifier;
use crate::types::RoundEvent;

/// Noop notifier (no-op).
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    fn name(&self) -> &'static str {
        "noop-notifier"
    }

    async fn publish(&self, _event: &RoundEvent) -> Result<()> {
        Ok(())
    }
}
