//! Error types for the fetch orchestrator.

use thiserror::Error;

/// Result type alias using the fetchstate error type.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Main error type for retrieval and orchestration.
///
/// Retrieval errors never reach the embedding context directly: the
/// orchestrator folds them into a [`FailureReason`](crate::request::FailureReason)
/// and publishes that instead. The variants surface as `Err` only from the
/// retrieval layer ([`HttpClient`](crate::http::HttpClient)) and when the
/// orchestrator is used after teardown.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The resource identifier could not be resolved into a request target
    #[error("Invalid resource identifier '{0}': {1}")]
    InvalidResource(String, String),

    /// The owning context has been torn down
    #[error("Orchestrator has been torn down")]
    TornDown,

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torn_down_display() {
        assert_eq!(
            FetchError::TornDown.to_string(),
            "Orchestrator has been torn down"
        );
    }

    #[test]
    fn test_display_includes_resource() {
        let err = FetchError::InvalidResource("/todos/1".to_string(), "no base URL".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid resource identifier '/todos/1': no base URL"
        );
    }
}
