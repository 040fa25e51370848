use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::traits::Notifier;
use crate::types::RoundEvent;

/// Webhook-based notifier.
/// POSTs each event as JSON to an HTTP endpoint (e.g. a social publishing bridge).
pub struct WebhookNotifier {
    url: String,
    auth_token: Option<String>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook http client")?;
        Ok(Self {
            url,
            auth_token: None,
            client,
        })
    }

    pub fn with_auth(mut self, token: String) -> Self {
        self.auth_token = Some(token);
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn publish(&self, event: &RoundEvent) -> Result<()> {
        let mut request = self.client.post(&self.url).json(event);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        request.send().await?.error_for_status()?;
        tracing::debug!("Webhook: published event for round {}", event.round_id());
        Ok(())
    }
}
