//! Schedule route handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cronhook_core::{Event, JobDefinition, JobId, JobStore, NewJob};
use cronhook_scheduler::{ActiveJobStatus, Recurrence, SchedulerError};

use crate::error::ApiError;
use crate::state::AppState;

/// Response for create/start/stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleActionResponse {
    pub status: String,
    pub schedule_id: JobId,
}

impl ScheduleActionResponse {
    fn new(status: &str, schedule_id: JobId) -> Self {
        Self {
            status: status.to_string(),
            schedule_id,
        }
    }
}

/// A stored definition and whether it is scheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub definition: JobDefinition,
    pub running: bool,
}

/// Response for listing schedules.
#[derive(Debug, Serialize)]
pub struct ScheduleListResponse {
    pub count: usize,
    pub schedules: Vec<ScheduleView>,
}

/// Response for listing events.
#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub count: usize,
    pub events: Vec<Event>,
}

async fn load(state: &AppState, id: JobId) -> Result<JobDefinition, ApiError> {
    state
        .store
        .get_job(id)
        .await?
        .ok_or(ApiError::ScheduleNotFound(id))
}

fn stop_if_running(state: &AppState, id: JobId) -> Result<(), ApiError> {
    match state.registry.stop(id) {
        Ok(()) | Err(SchedulerError::NotRunning(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// POST /schedules
pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Json(job): Json<NewJob>,
) -> Result<(StatusCode, Json<ScheduleActionResponse>), ApiError> {
    job.validate()?;
    Recurrence::parse(&job.cron)?;

    let definition = state.store.create_job(job).await?;
    let id = definition.id;
    info!(job_id = id, "Created schedule '{}' ({})", definition.name, definition.cron);

    state.registry.start(definition)?;

    Ok((
        StatusCode::CREATED,
        Json(ScheduleActionResponse::new("created", id)),
    ))
}

/// GET /schedules
pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScheduleListResponse>, ApiError> {
    let schedules: Vec<ScheduleView> = state
        .store
        .list_jobs()
        .await?
        .into_iter()
        .map(|definition| ScheduleView {
            running: state.registry.is_running(definition.id),
            definition,
        })
        .collect();

    Ok(Json(ScheduleListResponse {
        count: schedules.len(),
        schedules,
    }))
}

/// GET /schedules/{id}
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> Result<Json<ScheduleView>, ApiError> {
    let definition = load(&state, id).await?;
    Ok(Json(ScheduleView {
        running: state.registry.is_running(id),
        definition,
    }))
}

/// DELETE /schedules/{id}
///
/// The job is stopped before its definition is removed. Its events are kept.
pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> Result<StatusCode, ApiError> {
    load(&state, id).await?;

    stop_if_running(&state, id)?;

    if !state.store.delete_job(id).await? {
        warn!(job_id = id, "Schedule vanished before delete");
        return Err(ApiError::ScheduleNotFound(id));
    }

    // A start may have slipped in while the delete was pending.
    stop_if_running(&state, id)?;

    info!(job_id = id, "Deleted schedule");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /schedules/{id}/start
pub async fn start_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> Result<Json<ScheduleActionResponse>, ApiError> {
    let definition = load(&state, id).await?;
    state.registry.start(definition)?;

    // The definition may have been deleted between the load and the start.
    if state.store.get_job(id).await?.is_none() {
        stop_if_running(&state, id)?;
        return Err(ApiError::ScheduleNotFound(id));
    }
    Ok(Json(ScheduleActionResponse::new("started", id)))
}

/// POST /schedules/{id}/stop
pub async fn stop_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> Result<Json<ScheduleActionResponse>, ApiError> {
    if !state.registry.is_running(id) {
        load(&state, id).await?;
    }
    state.registry.stop(id)?;
    Ok(Json(ScheduleActionResponse::new("stopped", id)))
}

/// GET /schedules/{id}/status
pub async fn schedule_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> Result<Json<ActiveJobStatus>, ApiError> {
    if !state.registry.is_running(id) {
        load(&state, id).await?;
    }
    Ok(Json(state.registry.status(id)))
}

/// GET /schedules/{id}/events
///
/// Events outlive their schedule, so this answers for deleted IDs too.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> Result<Json<EventListResponse>, ApiError> {
    let events = state.store.list_events(id).await?;
    Ok(Json(EventListResponse {
        count: events.len(),
        events,
    }))
}

#[cfg(test)]
#[path = "schedules_tests.rs"]
mod tests;
