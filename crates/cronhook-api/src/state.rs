//! Application state.

use std::sync::Arc;
use std::time::Instant;

use cronhook_core::Store;
use cronhook_scheduler::ScheduleRegistry;

/// Application state shared across handlers.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<ScheduleRegistry>,
    start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, registry: Arc<ScheduleRegistry>) -> Self {
        Self {
            store,
            registry,
            start_time: Instant::now(),
        }
    }

    /// Seconds since the state was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
