//! Typed request-state container with a stale-safe fetch orchestrator.
//!
//! A [`FetchOrchestrator`] is pointed at a resource identifier. It retrieves
//! the resource through an [`HttpClient`] and publishes the progress as a
//! [`RequestState`]: `Loading`, then `Success(T)` or `Failure(reason)`. Changing
//! the identifier starts over. Results belonging to a superseded identifier,
//! or arriving after the orchestrator was torn down, are never published.

pub mod domain;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod request;

// Re-export commonly used types
pub use domain::payload::Unknown;
pub use error::{FetchError, Result};
pub use http::{HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use orchestrator::{
    FetchOrchestrator, FetchSnapshot, IsSuccessFn, OrchestratorConfig, OrchestratorStats,
    default_is_success,
};
pub use request::*;
