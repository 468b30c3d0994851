//! Persistence seams and the in-memory store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::event::{Event, EventId, EventState, NewEvent, ResponseSnapshot};
use crate::job::{JobDefinition, JobId, NewJob};

/// Fields written by a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventUpdate {
    pub state: EventState,
    pub response: Option<ResponseSnapshot>,
    pub error: Option<String>,
}

impl EventUpdate {
    /// Transition to `state` without touching response or error.
    pub fn state(state: EventState) -> Self {
        Self {
            state,
            response: None,
            error: None,
        }
    }

    pub fn with_response(mut self, response: ResponseSnapshot) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Appends and updates execution records. Events are never deleted.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Append an event and return its ID.
    async fn create_event(&self, event: &NewEvent) -> Result<EventId, CoreError>;

    /// Update an existing event by ID.
    async fn update_event(&self, id: EventId, update: EventUpdate) -> Result<(), CoreError>;
}

/// Durable storage of job definitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a new definition and return it with its assigned ID.
    async fn create_job(&self, job: NewJob) -> Result<JobDefinition, CoreError>;

    /// Load a job by ID.
    async fn get_job(&self, id: JobId) -> Result<Option<JobDefinition>, CoreError>;

    /// Load all jobs ordered by ID.
    async fn list_jobs(&self) -> Result<Vec<JobDefinition>, CoreError>;

    /// Delete a job. Returns whether it existed. Its events are kept.
    async fn delete_job(&self, id: JobId) -> Result<bool, CoreError>;

    /// Record the time the endpoint last answered.
    async fn update_last_run(&self, id: JobId, at: DateTime<Utc>) -> Result<(), CoreError>;

    /// Events of one job, oldest first.
    async fn list_events(&self, job_id: JobId) -> Result<Vec<Event>, CoreError>;
}

/// Both persistence seams behind one object.
pub trait Store: JobStore + EventRecorder {}

impl<T: JobStore + EventRecorder> Store for T {}

/// In-memory store for tests and ephemeral runs.
pub struct MemoryStore {
    jobs: RwLock<HashMap<JobId, JobDefinition>>,
    events: RwLock<BTreeMap<EventId, Event>>,
    next_job_id: AtomicI64,
    next_event_id: AtomicI64,
}

impl MemoryStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            events: RwLock::new(BTreeMap::new()),
            next_job_id: AtomicI64::new(1),
            next_event_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventRecorder for MemoryStore {
    async fn create_event(&self, event: &NewEvent) -> Result<EventId, CoreError> {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let stored = Event {
            id,
            job_id: event.job_id,
            state: event.state,
            response: None,
            error: None,
            created_at: event.created_at,
        };
        self.events.write().await.insert(id, stored);
        Ok(id)
    }

    async fn update_event(&self, id: EventId, update: EventUpdate) -> Result<(), CoreError> {
        let mut events = self.events.write().await;
        let event = events.get_mut(&id).ok_or(CoreError::EventNotFound(id))?;
        event.state = update.state;
        if let Some(response) = update.response {
            event.response = Some(response.to_text());
        }
        if let Some(error) = update.error {
            event.error = Some(error);
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: NewJob) -> Result<JobDefinition, CoreError> {
        job.validate()?;
        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        let definition = job.into_definition(id, Utc::now());
        self.jobs.write().await.insert(id, definition.clone());
        Ok(definition)
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobDefinition>, CoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<JobDefinition>, CoreError> {
        let mut jobs: Vec<JobDefinition> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    async fn delete_job(&self, id: JobId) -> Result<bool, CoreError> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }

    async fn update_last_run(&self, id: JobId, at: DateTime<Utc>) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(CoreError::JobNotFound(id))?;
        job.last_run_at = Some(at);
        Ok(())
    }

    async fn list_events(&self, job_id: JobId) -> Result<Vec<Event>, CoreError> {
        Ok(self
            .events
            .read()
            .await
            .values()
            .filter(|event| event.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
