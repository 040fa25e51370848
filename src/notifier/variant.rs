use anyhow::Result;
use async_trait::async_trait;

use super::mock::MockNotifier;
use super::noop::NoopNotifier;
use super::webhook::WebhookNotifier;
use crate::traits::Notifier;
use crate::types::RoundEvent;

/// Enum representing all possible notifier implementations.
pub enum NotifierVariant {
    Noop(NoopNotifier),
    Mock(MockNotifier),
    Webhook(WebhookNotifier),
}

#[async_trait]
impl Notifier for NotifierVariant {
    fn name(&self) -> &'static str {
        match self {
            NotifierVariant::Noop(inner) => inner.name(),
            NotifierVariant::Mock(inner) => inner.name(),
            NotifierVariant::Webhook(inner) => inner.name(),
        }
    }

    async fn publish(&self, event: &RoundEvent) -> Result<()> {
        match self {
            NotifierVariant::Noop(inner) => inner.publish(event).await,
            NotifierVariant::Mock(inner) => inner.publish(event).await,
            NotifierVariant::Webhook(inner) => inner.publish(event).await,
        }
    }
}
