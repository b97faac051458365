//! Fetch orchestrator: retrieves a resource whenever its identifier changes
//! and publishes the request state without ever publishing a stale result.
//!
//! Every trigger bumps a generation counter and captures it. The outcome of a
//! retrieval is published only if, at resolution time and under the state
//! lock, its generation is still the current one and the orchestrator has not
//! been torn down. Transport aborts are an optimisation on top of that guard,
//! never a substitute for it.
use std::sync::Arc;
use std::sync::atomic::Ordering;

use metrics::{counter, histogram};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, Result};
use crate::http::{HttpClient, HttpResponse};
use crate::request::{
    CancellationReason, Fetch, FetchCompletionResult, FetchData, FetchId, RequestState,
    ResourceId,
};

pub mod types;

pub use types::{FetchSnapshot, OrchestratorStats};

use types::FetchCounters;

/// Predicate deciding whether a response counts as a success.
pub type IsSuccessFn = Arc<dyn Fn(&HttpResponse) -> bool + Send + Sync>;

/// Default success predicate: any 2xx status.
pub fn default_is_success(response: &HttpResponse) -> bool {
    (200..300).contains(&response.status)
}

fn default_is_success_fn() -> IsSuccessFn {
    Arc::new(default_is_success)
}

/// Configuration for the orchestrator.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Transport timeout per retrieval in milliseconds. `None` leaves it to the client.
    pub timeout_ms: Option<u64>,

    /// Abort the transport task of a superseded or torn-down fetch.
    /// Publication is guarded either way; this only frees the connection early.
    pub abort_in_flight: bool,

    /// Capacity of the transition broadcast. Slow subscribers that fall
    /// further behind than this observe `RecvError::Lagged`.
    pub transition_buffer: usize,

    /// Decides which responses are successes. Defaults to 2xx.
    #[serde(skip, default = "default_is_success_fn")]
    pub is_success: IsSuccessFn,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            abort_in_flight: true,
            transition_buffer: 64,
            is_success: Arc::new(default_is_success),
        }
    }
}

/// Mutable orchestrator state, only touched under the lock.
struct Inner {
    resource: Option<ResourceId>,
    generation: FetchId,
    /// Cancels the in-flight fetch of the current generation
    active: Option<CancellationToken>,
    torn_down: bool,
}

/// State shared between the orchestrator and its spawned fetch tasks.
struct Shared<T> {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<FetchSnapshot<T>>,
    transitions_tx: broadcast::Sender<FetchSnapshot<T>>,
    /// Child of the embedding context's shutdown token
    scope: CancellationToken,
    counters: FetchCounters,
}

impl<T> Shared<T> {
    fn is_torn_down(&self, inner: &Inner) -> bool {
        inner.torn_down || self.scope.is_cancelled()
    }

    fn discard(&self, resource: &ResourceId, generation: FetchId, reason: CancellationReason) {
        self.counters.discarded.fetch_add(1, Ordering::Relaxed);
        counter!(
            "fetchstate_stale_results_discarded_total",
            "reason" => reason.as_str()
        )
        .increment(1);
        tracing::debug!(
            resource = %resource,
            generation = %generation,
            reason = reason.as_str(),
            "Discarding stale fetch result"
        );
    }
}

impl<T: Clone + Send + Sync> Shared<T> {
    /// Publish `state` for the current generation. Caller holds the lock.
    fn publish_locked(&self, inner: &Inner, state: RequestState<T>) {
        let snapshot = FetchSnapshot {
            resource: inner.resource.clone(),
            generation: inner.generation,
            state: Some(state),
        };
        // No subscribers is fine
        let _ = self.transitions_tx.send(snapshot.clone());
        self.state_tx.send_replace(snapshot);
    }

    /// Publish a terminal state if `generation` is still current.
    fn publish_outcome(&self, data: &FetchData, result: FetchCompletionResult<T>) -> bool {
        let mut inner = self.inner.lock();

        if self.is_torn_down(&inner) {
            self.discard(&data.resource, data.id, CancellationReason::TornDown);
            return false;
        }
        if inner.generation != data.id {
            self.discard(&data.resource, data.id, CancellationReason::Superseded);
            return false;
        }

        inner.active = None;
        let duration_ms = result.elapsed().num_milliseconds();
        let state = result.into_request_state();

        let (outcome_counter, outcome) = match &state {
            RequestState::Failure(reason) => {
                tracing::info!(
                    resource = %data.resource,
                    generation = %data.id,
                    kind = reason.kind(),
                    error = %reason,
                    duration_ms,
                    "Fetch failed"
                );
                (&self.counters.failed, reason.kind())
            }
            _ => {
                tracing::info!(
                    resource = %data.resource,
                    generation = %data.id,
                    duration_ms,
                    "Fetch succeeded"
                );
                (&self.counters.succeeded, "success")
            }
        };
        outcome_counter.fetch_add(1, Ordering::Relaxed);
        histogram!("fetchstate_fetch_duration_seconds", "outcome" => outcome)
            .record(duration_ms as f64 / 1000.0);

        self.publish_locked(&inner, state);
        true
    }
}

/// Drives retrievals for a changing resource identifier and publishes their
/// [`RequestState`].
///
/// Owned by its embedding context. Dropping it, calling
/// [`teardown`](Self::teardown), or cancelling the shutdown token passed to
/// [`new`](Self::new) all end its lifetime: no state is published afterwards.
///
/// # Example
/// ```ignore
/// let orchestrator: FetchOrchestrator<Todo, _> = FetchOrchestrator::new(
///     Arc::new(ReqwestHttpClient::new().with_base_url("https://jsonplaceholder.typicode.com")?),
///     OrchestratorConfig::default(),
///     CancellationToken::new(),
/// );
/// orchestrator.set_resource("/todos/1")?;
/// let snapshot = orchestrator.settled().await;
/// ```
pub struct FetchOrchestrator<T, H: ?Sized> {
    http_client: Arc<H>,
    config: OrchestratorConfig,
    shared: Arc<Shared<T>>,
}

impl<T, H> FetchOrchestrator<T, H>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    H: HttpClient + ?Sized + 'static,
{
    /// Create an idle orchestrator.
    ///
    /// The orchestrator lives in a child scope of `shutdown_token`: cancelling
    /// the parent tears it down, tearing it down leaves the parent alone.
    pub fn new(
        http_client: Arc<H>,
        config: OrchestratorConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(FetchSnapshot::idle());
        let (transitions_tx, _) = broadcast::channel(config.transition_buffer.max(1));

        Self {
            http_client,
            config,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    resource: None,
                    generation: FetchId::default(),
                    active: None,
                    torn_down: false,
                }),
                state_tx,
                transitions_tx,
                scope: shutdown_token.child_token(),
                counters: FetchCounters::default(),
            }),
        }
    }

    /// Point the orchestrator at `resource`.
    ///
    /// Returns `Ok(false)` without doing anything if `resource` is already the
    /// current identifier. Otherwise supersedes any in-flight fetch, publishes
    /// `Loading` and issues exactly one retrieval, returning `Ok(true)`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// `FetchError::TornDown` once the orchestrator has been torn down.
    pub fn set_resource(&self, resource: impl Into<ResourceId>) -> Result<bool> {
        let resource = resource.into();
        let mut inner = self.shared.inner.lock();

        if self.shared.is_torn_down(&inner) {
            return Err(FetchError::TornDown);
        }

        if inner.resource.as_ref() == Some(&resource) {
            tracing::debug!(resource = %resource, "Resource unchanged, not re-triggering");
            return Ok(false);
        }

        self.trigger_locked(&mut inner, resource);
        Ok(true)
    }

    /// Retrieve the current resource again under a new generation.
    ///
    /// Returns `Ok(false)` when no resource has been set yet.
    ///
    /// # Errors
    /// `FetchError::TornDown` once the orchestrator has been torn down.
    pub fn refetch(&self) -> Result<bool> {
        let mut inner = self.shared.inner.lock();

        if self.shared.is_torn_down(&inner) {
            return Err(FetchError::TornDown);
        }

        match inner.resource.clone() {
            Some(resource) => {
                self.trigger_locked(&mut inner, resource);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn trigger_locked(&self, inner: &mut Inner, resource: ResourceId) {
        if let Some(previous) = inner.active.take() {
            previous.cancel();
        }

        inner.generation = inner.generation.next();
        inner.resource = Some(resource.clone());

        let token = self.shared.scope.child_token();
        inner.active = Some(token.clone());

        tracing::info!(
            resource = %resource,
            generation = %inner.generation,
            "Triggering fetch"
        );

        self.shared.counters.started.fetch_add(1, Ordering::Relaxed);
        self.shared.publish_locked(inner, RequestState::Loading);

        let loading = Fetch::new(FetchData {
            id: inner.generation,
            resource,
        })
        .start(self.http_client.clone(), self.config.timeout_ms);

        let shared = self.shared.clone();
        let scope = self.shared.scope.clone();
        let is_success = self.config.is_success.clone();
        let abort_in_flight = self.config.abort_in_flight;

        tokio::spawn(async move {
            let data = loading.data.clone();
            let cancellation = async move {
                token.cancelled().await;
                if scope.is_cancelled() {
                    CancellationReason::TornDown
                } else {
                    CancellationReason::Superseded
                }
            };

            match loading
                .complete::<T, _, _>(&*is_success, cancellation, abort_in_flight)
                .await
            {
                Ok(result) => {
                    shared.publish_outcome(&data, result);
                }
                Err(reason) => shared.discard(&data.resource, data.id, reason),
            }
        });
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> FetchSnapshot<T> {
        self.shared.state_tx.borrow().clone()
    }

    /// The latest published state, `None` while idle.
    pub fn state(&self) -> Option<RequestState<T>> {
        self.shared.state_tx.borrow().state.clone()
    }

    /// Observe the latest snapshot. Intermediate snapshots may be skipped;
    /// use [`transitions`](Self::transitions) to see every one.
    pub fn subscribe(&self) -> watch::Receiver<FetchSnapshot<T>> {
        self.shared.state_tx.subscribe()
    }

    /// Observe every publication from now on, in order.
    pub fn transitions(&self) -> broadcast::Receiver<FetchSnapshot<T>> {
        self.shared.transitions_tx.subscribe()
    }

    /// Wait until the current generation is settled and return its snapshot.
    ///
    /// Waits for whichever generation is current when the state settles, so a
    /// trigger issued while waiting extends the wait. Returns the current
    /// snapshot straight away while idle, and as soon as the orchestrator is
    /// torn down, since nothing will be published after that.
    pub async fn settled(&self) -> FetchSnapshot<T> {
        let mut rx = self.subscribe();
        tokio::select! {
            result = rx.wait_for(|s| s.is_idle() || s.is_settled()) => match result {
                Ok(snapshot) => snapshot.clone(),
                Err(_) => self.snapshot(),
            },
            _ = self.shared.scope.cancelled() => self.snapshot(),
        }
    }
}

impl<T, H: ?Sized> FetchOrchestrator<T, H> {
    /// The identifier of the current generation, if any.
    pub fn resource(&self) -> Option<ResourceId> {
        self.shared.inner.lock().resource.clone()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.shared.counters.snapshot()
    }

    pub fn is_torn_down(&self) -> bool {
        let inner = self.shared.inner.lock();
        self.shared.is_torn_down(&inner)
    }

    /// End the orchestrator's lifetime.
    ///
    /// Cancels the in-flight fetch and the orchestrator's scope. Nothing is
    /// published afterwards, even if a retrieval that was already in flight
    /// resolves later. Idempotent.
    pub fn teardown(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.torn_down {
            return;
        }
        inner.torn_down = true;
        if let Some(active) = inner.active.take() {
            active.cancel();
        }
        self.shared.scope.cancel();

        tracing::info!(
            resource = ?inner.resource,
            generation = %inner.generation,
            "Orchestrator torn down"
        );
    }
}

impl<T, H: ?Sized> Drop for FetchOrchestrator<T, H> {
    fn drop(&mut self) {
        self.teardown();
    }
}
