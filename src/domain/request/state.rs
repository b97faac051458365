//! Core types for the request lifecycle.
//!
//! Two views of the same lifecycle live here:
//!
//! - [`RequestState`] is the published, three-form record an embedding
//!   context observes: loading, success with data, or failure with an error.
//! - [`Fetch<P>`] is the internal typestate record the orchestrator drives
//!   from `Idle` through `Loading` to `Succeeded` or `Failed`, with each phase
//!   enforced at compile time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::error::Result;
use crate::http::HttpResponse;

/// Identifier of the resource to retrieve.
///
/// Opaque to the orchestrator: two identifiers are "the same" exactly when
/// their strings are equal. The retrieval layer decides how to resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        ResourceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        ResourceId(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        ResourceId(id)
    }
}

impl From<reqwest::Url> for ResourceId {
    fn from(url: reqwest::Url) -> Self {
        ResourceId(url.into())
    }
}

/// Generation number of a trigger.
///
/// Every trigger gets the next generation; a result may only be published
/// while its generation is still the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FetchId(pub u64);

impl FetchId {
    pub fn next(self) -> FetchId {
        FetchId(self.0 + 1)
    }
}

impl std::fmt::Display for FetchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Published state
// ============================================================================

/// Progress or outcome of a retrieval, as observed by the embedding context.
///
/// Exactly one of three forms holds:
///
/// | form        | `loading()` | `data()`  | `error()` |
/// |-------------|-------------|-----------|-----------|
/// | `Loading`   | `true`      | `None`    | `None`    |
/// | `Success`   | `false`     | `Some`    | `None`    |
/// | `Failure`   | `false`     | `None`    | `Some`    |
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum RequestState<T> {
    Loading,
    Success(T),
    Failure(FailureReason),
}

impl<T> RequestState<T> {
    pub fn loading(&self) -> bool {
        matches!(self, RequestState::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            RequestState::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Human-readable error description, present only for `Failure`.
    pub fn error(&self) -> Option<String> {
        match self {
            RequestState::Failure(reason) => Some(reason.to_error_message()),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match self {
            RequestState::Failure(reason) => Some(reason),
            _ => None,
        }
    }

    /// `Success` and `Failure` are terminal until the identifier changes.
    pub fn is_terminal(&self) -> bool {
        !self.loading()
    }

    pub fn variant(&self) -> &'static str {
        match self {
            RequestState::Loading => "Loading",
            RequestState::Success(_) => "Success",
            RequestState::Failure(_) => "Failure",
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RequestState<U> {
        match self {
            RequestState::Loading => RequestState::Loading,
            RequestState::Success(data) => RequestState::Success(f(data)),
            RequestState::Failure(reason) => RequestState::Failure(reason),
        }
    }
}

/// Reason why a retrieval failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum FailureReason {
    /// The retrieval call itself failed (unreachable host, DNS, timeout, ...).
    Transport { error: String },

    /// The retrieval completed but the status was not a success.
    HttpStatus { status: u16, body: String },

    /// The body could not be interpreted as the expected shape.
    Parse { error: String },

    /// The retrieval task terminated without reporting a result.
    TaskTerminated,
}

impl FailureReason {
    /// Returns a human-readable error message for this failure reason.
    pub fn to_error_message(&self) -> String {
        match self {
            FailureReason::Transport { error } => format!("Network error: {}", error),
            FailureReason::HttpStatus { status, .. } => format!("HTTP error {}", status),
            FailureReason::Parse { error } => format!("Failed to parse response: {}", error),
            FailureReason::TaskTerminated => "Fetch task terminated unexpectedly".to_string(),
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::Transport { .. } | FailureReason::TaskTerminated => "transport",
            FailureReason::HttpStatus { .. } => "status",
            FailureReason::Parse { .. } => "parse",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_error_message())
    }
}

// ============================================================================
// Typestate lifecycle
// ============================================================================

/// Marker trait for valid fetch phases.
pub trait FetchPhase: Send + Sync {}

/// A single retrieval driven by the orchestrator.
///
/// The generic parameter `P` is the current phase of the fetch.
#[derive(Debug)]
pub struct Fetch<P: FetchPhase> {
    /// The current phase of the fetch.
    pub state: P,
    /// What is being fetched, and under which generation.
    pub data: FetchData,
}

/// Immutable description of a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchData {
    pub id: FetchId,
    pub resource: ResourceId,
}

/// Fetch has been created for a trigger but not yet started.
#[derive(Debug, Clone)]
pub struct Idle {}

impl FetchPhase for Idle {}

/// The retrieval is in flight.
#[derive(Debug)]
pub struct Loading {
    pub started_at: DateTime<Utc>,
    /// Receives the transport result from the spawned task
    pub result_rx: mpsc::Receiver<Result<HttpResponse>>,
    /// Handle to abort the in-flight transport task
    pub abort_handle: AbortHandle,
}

impl FetchPhase for Loading {}

/// The retrieval succeeded and the body was parsed.
#[derive(Debug, Clone)]
pub struct Succeeded<T> {
    pub value: T,
    pub status: u16,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl<T: Send + Sync> FetchPhase for Succeeded<T> {}

/// The retrieval failed.
#[derive(Debug, Clone)]
pub struct Failed {
    pub reason: FailureReason,
    pub started_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
}

impl FetchPhase for Failed {}

/// Result of completing a loading fetch.
#[derive(Debug)]
pub enum FetchCompletionResult<T: Send + Sync> {
    Succeeded(Fetch<Succeeded<T>>),
    Failed(Fetch<Failed>),
}

impl<T: Send + Sync> FetchCompletionResult<T> {
    /// Time from spawning the retrieval to classifying its result.
    pub fn elapsed(&self) -> chrono::Duration {
        match self {
            FetchCompletionResult::Succeeded(f) => f.state.completed_at - f.state.started_at,
            FetchCompletionResult::Failed(f) => f.state.failed_at - f.state.started_at,
        }
    }

    /// Collapse into the published form.
    pub fn into_request_state(self) -> RequestState<T> {
        match self {
            FetchCompletionResult::Succeeded(f) => RequestState::Success(f.state.value),
            FetchCompletionResult::Failed(f) => RequestState::Failure(f.state.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forms_are_mutually_exclusive() {
        let loading: RequestState<u32> = RequestState::Loading;
        assert!(loading.loading());
        assert!(loading.data().is_none());
        assert!(loading.error().is_none());
        assert!(!loading.is_terminal());

        let success = RequestState::Success(7u32);
        assert!(!success.loading());
        assert_eq!(success.data(), Some(&7));
        assert!(success.error().is_none());
        assert!(success.is_terminal());

        let failure: RequestState<u32> = RequestState::Failure(FailureReason::HttpStatus {
            status: 404,
            body: String::new(),
        });
        assert!(!failure.loading());
        assert!(failure.data().is_none());
        assert_eq!(failure.error().as_deref(), Some("HTTP error 404"));
        assert!(failure.is_terminal());
    }

    #[test]
    fn test_failure_reason_kinds() {
        assert_eq!(
            FailureReason::Transport {
                error: "dns".into()
            }
            .kind(),
            "transport"
        );
        assert_eq!(FailureReason::TaskTerminated.kind(), "transport");
        assert_eq!(
            FailureReason::Parse {
                error: "eof".into()
            }
            .kind(),
            "parse"
        );
    }

    #[test]
    fn test_map_preserves_form() {
        let state = RequestState::Success(2u32).map(|n| n * 10);
        assert_eq!(state, RequestState::Success(20));

        let failure: RequestState<u32> = RequestState::Failure(FailureReason::TaskTerminated);
        assert_eq!(
            failure.map(|n| n.to_string()).variant(),
            "Failure"
        );
    }

    #[test]
    fn test_request_state_serialization() {
        let state = RequestState::Success(serde_json::json!({"id": 1}));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, serde_json::json!({"state": "success", "value": {"id": 1}}));

        let loading: RequestState<()> = RequestState::Loading;
        assert_eq!(
            serde_json::to_value(&loading).unwrap(),
            serde_json::json!({"state": "loading"})
        );
    }

    #[test]
    fn test_resource_id_from_url() {
        let url = reqwest::Url::parse("https://example.com/todos/1").unwrap();
        assert_eq!(ResourceId::from(url).as_str(), "https://example.com/todos/1");
    }
}
