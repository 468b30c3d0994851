//! One timer firing, end to end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cronhook_core::{
    EventId, EventRecorder, EventState, EventUpdate, JobDefinition, JobStore, NewEvent,
    ResponseSnapshot, Store,
};

use crate::dispatcher::{WebhookDispatcher, WebhookRequest};
use crate::error::WebhookError;

/// Error text of a firing skipped by the overlap policy.
pub const SKIPPED_MESSAGE: &str = "skipped: previous execution still running";

/// Error text of a firing aborted by `stop`.
pub const STOPPED_MESSAGE: &str = "schedule stopped";

/// Outcome of one firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firing {
    pub event_id: EventId,
    pub state: EventState,
}

/// Per-job flag marking a firing in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicBool>);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag. `None` if another firing holds it.
    pub fn try_acquire(&self) -> Option<InFlightGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(self.0.clone()))
    }

    /// Whether a firing currently holds the flag.
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the in-flight flag on drop.
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs firings: records the event, dispatches, and records the outcome.
pub struct JobRunner {
    store: Arc<dyn Store>,
    dispatcher: Arc<WebhookDispatcher>,
}

impl JobRunner {
    /// Create a new runner.
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Run one firing of `job`.
    ///
    /// Returns `None` when the initial event could not be recorded; nothing is
    /// dispatched in that case.
    pub async fn fire(
        &self,
        job: Arc<JobDefinition>,
        cancel: CancellationToken,
        in_flight: &InFlight,
    ) -> Option<Firing> {
        let event_id = match self.store.create_event(&NewEvent::created(job.id)).await {
            Ok(id) => id,
            Err(e) => {
                error!(job_id = job.id, "Failed to record firing, skipping dispatch: {}", e);
                return None;
            }
        };

        let Some(_guard) = in_flight.try_acquire() else {
            warn!(job_id = job.id, event_id, "Previous firing still running, skipping");
            self.record(event_id, EventUpdate::state(EventState::Pending).with_error(SKIPPED_MESSAGE))
                .await;
            self.record(event_id, EventUpdate::state(EventState::Canceled)).await;
            return Some(Firing {
                event_id,
                state: EventState::Canceled,
            });
        };

        let request = WebhookRequest::from(job.as_ref());
        let dispatcher = self.dispatcher.clone();
        let scope = cancel.clone();
        let mut task = tokio::spawn(async move { dispatcher.dispatch(&request, &scope).await });

        self.record(event_id, EventUpdate::state(EventState::Running)).await;
        debug!(job_id = job.id, event_id, "Dispatching {} {}", job.method, job.endpoint);

        let update = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                task.abort();
                EventUpdate::state(EventState::Canceled).with_error(STOPPED_MESSAGE)
            }
            joined = &mut task => {
                if cancel.is_cancelled() {
                    EventUpdate::state(EventState::Canceled).with_error(STOPPED_MESSAGE)
                } else {
                    match joined {
                        Ok(result) => self.conclude(&job, result).await,
                        Err(e) => EventUpdate::state(EventState::Failed)
                            .with_error(format!("dispatch task failed: {e}")),
                    }
                }
            }
        };

        let state = update.state;
        match state {
            EventState::Success => info!(job_id = job.id, event_id, "Webhook '{}' succeeded", job.name),
            EventState::Canceled => info!(job_id = job.id, event_id, "Webhook '{}' canceled", job.name),
            _ => warn!(
                job_id = job.id,
                event_id,
                "Webhook '{}' failed: {}",
                job.name,
                update.error.as_deref().unwrap_or("unknown error")
            ),
        }
        self.record(event_id, update).await;

        Some(Firing { event_id, state })
    }

    /// Turn a dispatch result into the terminal update.
    async fn conclude(
        &self,
        job: &JobDefinition,
        result: Result<ResponseSnapshot, WebhookError>,
    ) -> EventUpdate {
        match result {
            Ok(snapshot) => {
                if let Err(e) = self.store.update_last_run(job.id, Utc::now()).await {
                    warn!(job_id = job.id, "Failed to update last run time: {}", e);
                }

                let update = EventUpdate::state(snapshot.outcome());
                let update = if snapshot.is_success() {
                    update
                } else {
                    update.with_error(format!(
                        "endpoint responded with status {}",
                        snapshot.status_code
                    ))
                };
                update.with_response(snapshot)
            }
            Err(e) => EventUpdate::state(EventState::Failed).with_error(e.to_string()),
        }
    }

    async fn record(&self, event_id: EventId, update: EventUpdate) {
        let state = update.state;
        if let Err(e) = self.store.update_event(event_id, update).await {
            error!(event_id, "Failed to record event state {}: {}", state, e);
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
