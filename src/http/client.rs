//! Production retrieval layer using reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::ACCEPT;

use super::{HttpClient, HttpResponse};
use crate::error::{FetchError, Result};
use crate::request::ResourceId;

/// Production HTTP client using reqwest.
///
/// Issues a `GET` per call. Absolute identifiers are used as-is, relative
/// ones are joined onto the base URL when one is configured.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl ReqwestHttpClient {
    /// Create a new reqwest-based HTTP client with no base URL.
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Wrap a preconfigured reqwest client (proxies, default headers, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    /// Resolve relative identifiers against `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url)
            .map_err(|e| FetchError::InvalidResource(base_url.to_string(), e.to_string()))?;
        self.base_url = Some(url);
        Ok(self)
    }

    /// Resolve an identifier into the URL that will be requested.
    pub fn resolve(&self, resource: &ResourceId) -> Result<Url> {
        match (Url::parse(resource.as_str()), &self.base_url) {
            (Ok(url), _) => Ok(url),
            (Err(_), Some(base)) => base
                .join(resource.as_str())
                .map_err(|e| FetchError::InvalidResource(resource.to_string(), e.to_string())),
            (Err(e), None) => Err(FetchError::InvalidResource(
                resource.to_string(),
                format!("{e} (no base URL configured)"),
            )),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, resource), fields(resource = %resource))]
    async fn execute(
        &self,
        resource: &ResourceId,
        timeout_ms: Option<u64>,
    ) -> Result<HttpResponse> {
        let url = self.resolve(resource)?;

        tracing::debug!(url = %url, timeout_ms = ?timeout_ms, "Executing HTTP request");

        let mut req = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json");

        if let Some(timeout_ms) = timeout_ms {
            req = req.timeout(Duration::from_millis(timeout_ms));
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "HTTP request failed");
            e
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::info!(
            status = status,
            response_len = body.len(),
            "HTTP request completed"
        );

        Ok(HttpResponse { status, body })
    }
}
