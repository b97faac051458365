//! HTTP client abstraction for retrieving resources.
//!
//! This module defines the `HttpClient` trait to abstract retrieval,
//! enabling testability with mock implementations.

use async_trait::async_trait;

use crate::error::Result;
use crate::request::ResourceId;

mod client;
mod mock;

pub use client::ReqwestHttpClient;
pub use mock::{MockCall, MockHttpClient};

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    /// Convenience constructor, mostly for tests and mocks.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Trait for retrieving a resource.
///
/// The orchestrator only relies on two things from an implementation: that a
/// non-success outcome is detectable (an `Err`, or a status rejected by the
/// configured success predicate) and that a successful body can be parsed.
///
/// # Example
/// ```ignore
/// let client = ReqwestHttpClient::new().with_base_url("https://jsonplaceholder.typicode.com")?;
/// let response = client.execute(&ResourceId::from("/todos/1"), Some(5000)).await?;
/// println!("Status: {}, Body: {}", response.status, response.body);
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Retrieve `resource`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The identifier cannot be resolved into a URL
    /// - The request fails due to network issues
    /// - The request times out (only when `timeout_ms` is set)
    async fn execute(&self, resource: &ResourceId, timeout_ms: Option<u64>)
    -> Result<HttpResponse>;
}
