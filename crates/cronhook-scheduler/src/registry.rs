//! Schedule registry: the set of active jobs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use cronhook_core::{JobDefinition, JobId};

use crate::cron_timer::CronTimer;
use crate::error::SchedulerError;
use crate::recurrence::Recurrence;
use crate::runner::{InFlight, JobRunner};

/// A registered job with its timer and cancellation scope.
struct ActiveJob {
    definition: Arc<JobDefinition>,
    timer: CronTimer,
    cancel: CancellationToken,
    in_flight: InFlight,
}

/// Scheduling status of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJobStatus {
    pub id: JobId,
    /// Whether the job has an active timer.
    pub running: bool,
    /// Whether a firing is in progress right now.
    pub firing: bool,
    pub next_run: Option<DateTime<Utc>>,
    /// Firings since the job was started.
    pub fire_count: u64,
}

/// Tracks which jobs are scheduled.
///
/// The map lock is only held for lookups and mutations; no network or
/// persistence call happens under it.
pub struct ScheduleRegistry {
    jobs: Mutex<HashMap<JobId, ActiveJob>>,
    runner: Arc<JobRunner>,
    tracker: TaskTracker,
}

impl ScheduleRegistry {
    /// Create an empty registry.
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            runner,
            tracker: TaskTracker::new(),
        }
    }

    /// Start firing `definition` on its schedule.
    ///
    /// Fails with [`SchedulerError::AlreadyRunning`] if the job is already active
    /// (to change a definition, stop it first) and with
    /// [`SchedulerError::InvalidRecurrenceExpression`] if its cron expression
    /// does not parse. Nothing is registered on failure.
    pub fn start(&self, definition: JobDefinition) -> Result<(), SchedulerError> {
        let id = definition.id;
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&id) {
            return Err(SchedulerError::AlreadyRunning(id));
        }

        let recurrence = Recurrence::parse(&definition.cron)?;
        let definition = Arc::new(definition);
        let cancel = CancellationToken::new();
        let in_flight = InFlight::new();

        let timer = CronTimer::start(
            format!("job-{id}"),
            recurrence,
            cancel.clone(),
            self.tracker.clone(),
            {
                let runner = self.runner.clone();
                let definition = definition.clone();
                let cancel = cancel.clone();
                let in_flight = in_flight.clone();
                move || {
                    let runner = runner.clone();
                    let definition = definition.clone();
                    let cancel = cancel.clone();
                    let in_flight = in_flight.clone();
                    async move {
                        runner.fire(definition, cancel, &in_flight).await;
                    }
                }
            },
        );

        info!(
            job_id = id,
            "Started schedule '{}' ({})", definition.name, definition.cron
        );
        jobs.insert(
            id,
            ActiveJob {
                definition,
                timer,
                cancel,
                in_flight,
            },
        );
        Ok(())
    }

    /// Stop a job: no further firings, and an in-flight firing is canceled.
    pub fn stop(&self, id: JobId) -> Result<(), SchedulerError> {
        let job = self
            .jobs
            .lock()
            .remove(&id)
            .ok_or(SchedulerError::NotRunning(id))?;

        job.cancel.cancel();
        info!(job_id = id, "Stopped schedule '{}'", job.definition.name);
        Ok(())
    }

    /// Whether the job has an active timer.
    pub fn is_running(&self, id: JobId) -> bool {
        self.jobs.lock().contains_key(&id)
    }

    /// Number of active jobs.
    pub fn active_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Scheduling status of a job. Inactive jobs report `running: false`.
    pub fn status(&self, id: JobId) -> ActiveJobStatus {
        match self.jobs.lock().get(&id) {
            Some(job) => ActiveJobStatus {
                id,
                running: true,
                firing: job.in_flight.is_busy(),
                next_run: job.timer.next_fire_time(),
                fire_count: job.timer.fire_count(),
            },
            None => ActiveJobStatus {
                id,
                running: false,
                firing: false,
                next_run: None,
                fire_count: 0,
            },
        }
    }

    /// Stop every job and wait for timers and in-flight firings to finish.
    pub async fn shutdown(&self) {
        let drained: Vec<ActiveJob> = self.jobs.lock().drain().map(|(_, job)| job).collect();
        info!("Stopping {} schedule(s)", drained.len());

        for job in &drained {
            job.cancel.cancel();
        }
        for job in drained {
            job.timer.join().await;
        }

        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
        debug!("All firings finished");
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
