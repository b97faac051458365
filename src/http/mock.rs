//! Scriptable retrieval layer for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::{HttpClient, HttpResponse};
use crate::error::{FetchError, Result};
use crate::request::ResourceId;

/// Mock HTTP client for testing.
///
/// Allows configuring predetermined responses per resource identifier without
/// making actual HTTP calls.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.add_response("/todos/1", Ok(HttpResponse::new(200, r#"{"id":1}"#)));
/// ```
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
}

/// A mock response that can optionally wait for a trigger before completing.
enum MockResponse {
    Immediate(Result<HttpResponse>),
    Triggered {
        response: Result<HttpResponse>,
        trigger: oneshot::Receiver<()>,
    },
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub resource: ResourceId,
    pub timeout_ms: Option<u64>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predetermined response for `resource`.
    ///
    /// Multiple responses for the same identifier are returned in FIFO order.
    pub fn add_response(&self, resource: &str, response: Result<HttpResponse>) {
        self.responses
            .lock()
            .entry(resource.to_string())
            .or_default()
            .push_back(MockResponse::Immediate(response));
    }

    /// Add a response that will wait for a manual trigger before completing.
    ///
    /// Returns a sender that when triggered (by sending `()` or dropping) will
    /// cause the call to complete with the given response.
    pub fn add_response_with_trigger(
        &self,
        resource: &str,
        response: Result<HttpResponse>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.responses
            .lock()
            .entry(resource.to_string())
            .or_default()
            .push_back(MockResponse::Triggered {
                response,
                trigger: rx,
            });
        tx
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls currently executing.
    ///
    /// Drops back when a call finishes or its task is aborted, which is how
    /// tests observe transport-level cancellation.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(
        &self,
        resource: &ResourceId,
        timeout_ms: Option<u64>,
    ) -> Result<HttpResponse> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
        };

        self.calls.lock().push(MockCall {
            resource: resource.clone(),
            timeout_ms,
        });

        let mock_response = self
            .responses
            .lock()
            .get_mut(resource.as_str())
            .and_then(VecDeque::pop_front);

        match mock_response {
            Some(MockResponse::Immediate(response)) => response,
            Some(MockResponse::Triggered { response, trigger }) => {
                // Proceed whether the sender fired or was dropped
                let _ = trigger.await;
                response
            }
            None => Err(FetchError::Other(anyhow::anyhow!(
                "No mock response configured for {}",
                resource
            ))),
        }
    }
}

/// Decrements the in-flight counter when dropped, including on abort.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_basic() {
        let mock = MockHttpClient::new();
        mock.add_response("/todos/1", Ok(HttpResponse::new(200, "success")));

        let response = mock
            .execute(&ResourceId::from("/todos/1"), Some(5000))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "success");

        let calls = mock.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].resource.as_str(), "/todos/1");
        assert_eq!(calls[0].timeout_ms, Some(5000));
    }

    #[tokio::test]
    async fn test_mock_client_multiple_responses() {
        let mock = MockHttpClient::new();
        mock.add_response("/status", Ok(HttpResponse::new(200, "first")));
        mock.add_response("/status", Ok(HttpResponse::new(200, "second")));

        let resource = ResourceId::from("/status");
        assert_eq!(mock.execute(&resource, None).await.unwrap().body, "first");
        assert_eq!(mock.execute(&resource, None).await.unwrap().body, "second");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_client_no_response() {
        let mock = MockHttpClient::new();
        let result = mock.execute(&ResourceId::from("/unknown"), None).await;
        assert!(result.is_err());
        assert_eq!(mock.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_client_with_trigger() {
        let mock = MockHttpClient::new();
        let trigger =
            mock.add_response_with_trigger("/slow", Ok(HttpResponse::new(200, "triggered")));

        let mock_clone = mock.clone();
        let handle = tokio::spawn(async move {
            mock_clone
                .execute(&ResourceId::from("/slow"), None)
                .await
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        assert_eq!(mock.in_flight_count(), 1);

        trigger.send(()).unwrap();

        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.body, "triggered");
        assert_eq!(mock.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_aborted_call_releases_in_flight() {
        let mock = MockHttpClient::new();
        let _trigger = mock.add_response_with_trigger("/slow", Ok(HttpResponse::new(200, "")));

        let mock_clone = mock.clone();
        let handle = tokio::spawn(async move {
            mock_clone
                .execute(&ResourceId::from("/slow"), None)
                .await
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        assert_eq!(mock.in_flight_count(), 1);

        handle.abort();
        let _ = handle.await;
        assert_eq!(mock.in_flight_count(), 0);
    }
}
