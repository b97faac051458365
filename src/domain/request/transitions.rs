//! State transitions for a fetch using the typestate pattern.
//!
//! ```text
//! Fetch<Idle> ──start()──> Fetch<Loading> ──complete()──> Fetch<Succeeded<T>>
//!                                 │          └─complete()──> Fetch<Failed>
//!                                 └──complete() on cancellation──> Err(Superseded | TornDown)
//! ```
//!
//! ## Idle → Loading
//!
//! The retrieval is spawned as its own task. Its result comes back over a
//! channel and the task's abort handle is kept so the transport can be
//! cancelled.
//!
//! ## Loading → Succeeded / Failed
//!
//! The result is classified:
//! - **Success**: the status passes the `is_success` predicate and the body
//!   parses as `T`
//! - **Status failure**: the status is rejected by the predicate
//! - **Parse failure**: the body does not parse as `T`
//! - **Transport failure**: the client returned an error, or the task died
//!
//! ## Cancellation
//!
//! `complete()` races the result against a cancellation future. If the
//! cancellation wins, no terminal state is produced at all and the caller
//! receives the [`CancellationReason`] as the error.

use std::sync::Arc;

use metrics::counter;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::http::{HttpClient, HttpResponse};

use super::state::{
    Failed, FailureReason, Fetch, FetchCompletionResult, FetchData, Idle, Loading, Succeeded,
};

/// Reason for cancelling a loading fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    /// A newer trigger replaced this fetch.
    Superseded,
    /// The owning context went away.
    TornDown,
}

impl CancellationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationReason::Superseded => "superseded",
            CancellationReason::TornDown => "torn_down",
        }
    }
}

impl Fetch<Idle> {
    pub fn new(data: FetchData) -> Self {
        Fetch {
            state: Idle {},
            data,
        }
    }

    /// Spawn the retrieval and move into `Loading`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<H: HttpClient + ?Sized + 'static>(
        self,
        http_client: Arc<H>,
        timeout_ms: Option<u64>,
    ) -> Fetch<Loading> {
        let resource = self.data.resource.clone();
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        let task_handle = tokio::spawn(async move {
            let result = http_client.execute(&resource, timeout_ms).await;
            let _ = tx.send(result).await; // Receiver dropped means nobody cares
        });

        Fetch {
            data: self.data,
            state: Loading {
                started_at: chrono::Utc::now(),
                result_rx: rx,
                abort_handle: task_handle.abort_handle(),
            },
        }
    }
}

impl Fetch<Loading> {
    /// Wait for the retrieval to finish and classify the outcome.
    ///
    /// `is_success` decides which statuses count as success. When
    /// `cancellation` resolves first the transport task is aborted if
    /// `abort_on_cancel` is set, and its reason is returned as the error.
    pub async fn complete<T, F, Fut>(
        mut self,
        is_success: F,
        cancellation: Fut,
        abort_on_cancel: bool,
    ) -> std::result::Result<FetchCompletionResult<T>, CancellationReason>
    where
        T: DeserializeOwned + Send + Sync,
        F: Fn(&HttpResponse) -> bool,
        Fut: std::future::Future<Output = CancellationReason>,
    {
        // Resolve the race first so the receiver borrow ends before we act on it
        enum Outcome {
            Result(Option<Result<HttpResponse>>),
            Canceled(CancellationReason),
        }

        let outcome = tokio::select! {
            result = self.state.result_rx.recv() => Outcome::Result(result),
            reason = cancellation => Outcome::Canceled(reason),
        };

        let result = match outcome {
            Outcome::Result(result) => result,
            Outcome::Canceled(reason) => {
                if abort_on_cancel {
                    self.state.abort_handle.abort();
                }
                tracing::debug!(
                    resource = %self.data.resource,
                    generation = %self.data.id,
                    reason = reason.as_str(),
                    aborted = abort_on_cancel,
                    "Fetch cancelled before completion"
                );
                return Err(reason);
            }
        };

        let outcome = match result {
            Some(Ok(response)) if is_success(&response) => {
                match serde_json::from_str::<T>(&response.body) {
                    Ok(value) => Ok((value, response.status)),
                    Err(e) => Err(FailureReason::Parse {
                        error: e.to_string(),
                    }),
                }
            }
            Some(Ok(response)) => Err(FailureReason::HttpStatus {
                status: response.status,
                body: response.body,
            }),
            Some(Err(e)) => Err(FailureReason::Transport {
                error: e.to_string(),
            }),
            // Channel closed: the task died without sending a result
            None => Err(FailureReason::TaskTerminated),
        };

        match outcome {
            Ok((value, status)) => {
                counter!("fetchstate_fetches_total", "outcome" => "success").increment(1);
                Ok(FetchCompletionResult::Succeeded(Fetch {
                    data: self.data,
                    state: Succeeded {
                        value,
                        status,
                        started_at: self.state.started_at,
                        completed_at: chrono::Utc::now(),
                    },
                }))
            }
            Err(reason) => {
                counter!("fetchstate_fetches_total", "outcome" => reason.kind()).increment(1);
                Ok(FetchCompletionResult::Failed(Fetch {
                    data: self.data,
                    state: Failed {
                        reason,
                        started_at: self.state.started_at,
                        failed_at: chrono::Utc::now(),
                    },
                }))
            }
        }
    }
}
