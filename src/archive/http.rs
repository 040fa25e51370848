use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::traits::ArchiveClient;
use crate::types::{RoundId, RoundRecord};

/// HTTP archive service client.
///
/// # Protocol
/// - PUT {base}/rounds/{id} - store a round record (201/200/204 stored, 409 already stored)
/// - GET {base}/rounds/max - `{"max_id": 41}` or `{"max_id": null}`
pub struct HttpArchive {
    base_url: String,
    auth_token: Option<String>,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct MaxIdResponse {
    max_id: Option<RoundId>,
}

impl HttpArchive {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build archive http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            client,
        })
    }

    pub fn with_auth(mut self, token: String) -> Self {
        self.auth_token = Some(token);
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ArchiveClient for HttpArchive {
    fn name(&self) -> &'static str {
        "http-archive"
    }

    async fn put(&self, round_id: RoundId, record: &RoundRecord) -> Result<()> {
        let url = format!("{}/rounds/{}", self.base_url, round_id);
        let response = self
            .authorize(self.client.put(&url).json(record))
            .send()
            .await
            .with_context(|| format!("archive PUT {} failed", url))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => {
                tracing::debug!("HTTP archive: round {} already stored", round_id);
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("archive PUT {} returned {}: {}", url, status, body)
            }
        }
    }

    async fn max_known_id(&self) -> Result<Option<RoundId>> {
        let url = format!("{}/rounds/max", self.base_url);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("archive GET {} failed", url))?
            .error_for_status()?;
        let body: MaxIdResponse = response.json().await?;
        Ok(body.max_id)
    }
}
