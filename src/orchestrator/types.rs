//! Values the orchestrator publishes to its embedding context.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::request::{FetchId, RequestState, ResourceId};

/// What an observer sees at any point in time.
///
/// `state` is `None` until the first trigger (the idle state); from then on
/// it always holds the state of the fetch for `resource` at `generation`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchSnapshot<T> {
    pub resource: Option<ResourceId>,
    pub generation: FetchId,
    pub state: Option<RequestState<T>>,
}

impl<T> FetchSnapshot<T> {
    pub fn idle() -> Self {
        Self {
            resource: None,
            generation: FetchId::default(),
            state: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_none()
    }

    /// The current generation reached `Success` or `Failure`.
    pub fn is_settled(&self) -> bool {
        self.state.as_ref().is_some_and(RequestState::is_terminal)
    }

    pub fn loading(&self) -> bool {
        self.state.as_ref().is_some_and(RequestState::loading)
    }

    pub fn data(&self) -> Option<&T> {
        self.state.as_ref().and_then(RequestState::data)
    }

    pub fn error(&self) -> Option<String> {
        self.state.as_ref().and_then(RequestState::error)
    }
}

/// Point-in-time orchestrator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    /// Retrievals issued (one per trigger).
    pub fetches_started: u64,
    /// `Success` states published.
    pub fetches_succeeded: u64,
    /// `Failure` states published.
    pub fetches_failed: u64,
    /// Outcomes dropped because they were stale at resolution time.
    pub results_discarded: u64,
}

#[derive(Debug, Default)]
pub(crate) struct FetchCounters {
    pub started: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub discarded: AtomicU64,
}

impl FetchCounters {
    pub fn snapshot(&self) -> OrchestratorStats {
        OrchestratorStats {
            fetches_started: self.started.load(Ordering::Relaxed),
            fetches_succeeded: self.succeeded.load(Ordering::Relaxed),
            fetches_failed: self.failed.load(Ordering::Relaxed),
            results_discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::FailureReason;

    #[test]
    fn test_idle_snapshot() {
        let snapshot: FetchSnapshot<u32> = FetchSnapshot::idle();
        assert!(snapshot.is_idle());
        assert!(!snapshot.loading());
        assert!(!snapshot.is_settled());
        assert!(snapshot.data().is_none());
        assert!(snapshot.error().is_none());
    }

    #[test]
    fn test_settled_snapshot() {
        let snapshot = FetchSnapshot {
            resource: Some(ResourceId::from("/todos/999999")),
            generation: FetchId(3),
            state: Some(RequestState::<u32>::Failure(FailureReason::HttpStatus {
                status: 404,
                body: "{}".to_string(),
            })),
        };
        assert!(snapshot.is_settled());
        assert_eq!(snapshot.error().as_deref(), Some("HTTP error 404"));
    }
}
