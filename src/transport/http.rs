use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Resource, Transport};
use crate::error::{FetchError, FetchResult};

/// Longest response body echoed back in a `FetchError::Status` message.
const MAX_ERROR_BODY: usize = 256;

/// Transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport rooted at `base_url` (e.g. `http://host/api/queue`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Uses an existing client, sharing its connection pool.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL every resource path is joined onto.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a resource, without the query string.
    pub fn url_for(&self, resource: &Resource) -> String {
        format!("{}/{}", self.base_url, resource.path())
    }

    async fn send(&self, resource: &Resource) -> FetchResult<Value> {
        let url = self.url_for(resource);
        let response = self
            .client
            .get(&url)
            .query(&resource.query_pairs())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.chars().take(MAX_ERROR_BODY).collect()
            };
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, resource: &Resource, cancel: &CancellationToken) -> FetchResult<Value> {
        debug!(resource = resource.path(), "sending request");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.send(resource) => result,
        }
    }
}
