//! HTTP route definitions.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::http::health::health_check;
use crate::http::schedules;
use crate::state::AppState;

/// Create the admin router.
///
/// ## Route Structure
///
/// ```text
/// /schedules
///   POST   /schedules              - Create, persist and start a schedule
///   GET    /schedules              - List schedules
///   GET    /schedules/{id}         - Get schedule
///   DELETE /schedules/{id}         - Stop and delete schedule
///   POST   /schedules/{id}/start   - Start a stored schedule
///   POST   /schedules/{id}/stop    - Stop a running schedule
///   GET    /schedules/{id}/status  - Scheduling status
///   GET    /schedules/{id}/events  - Execution events
///
/// /health  - Liveness with active schedule count
/// ```
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/schedules",
            post(schedules::create_schedule).get(schedules::list_schedules),
        )
        .route(
            "/schedules/{id}",
            get(schedules::get_schedule).delete(schedules::delete_schedule),
        )
        .route("/schedules/{id}/start", post(schedules::start_schedule))
        .route("/schedules/{id}/stop", post(schedules::stop_schedule))
        .route("/schedules/{id}/status", get(schedules::schedule_status))
        .route("/schedules/{id}/events", get(schedules::list_events))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
