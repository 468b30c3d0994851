//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cronhook_core::{CoreError, JobId};
use cronhook_scheduler::SchedulerError;

/// Errors returned by the admin API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No stored schedule with this ID.
    #[error("Schedule not found: {0}")]
    ScheduleNotFound(JobId),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ScheduleNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Core(CoreError::InvalidDefinition(_)) => StatusCode::BAD_REQUEST,
            ApiError::Core(CoreError::JobNotFound(_) | CoreError::EventNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Core(CoreError::Persistence(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Scheduler(SchedulerError::InvalidRecurrenceExpression { .. }) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Scheduler(SchedulerError::AlreadyRunning(_) | SchedulerError::NotRunning(_)) => {
                StatusCode::CONFLICT
            }
        }
    }
}

/// JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
