//! CronTimer - cron expression based timer task.
//!
//! Each timer runs on its own tokio task. At every fire time it spawns the
//! callback's future on a [`TaskTracker`] and immediately goes back to waiting
//! for the next fire time, so a slow firing never delays the schedule. Whether
//! overlapping firings may proceed is decided by the callback, not the timer.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::recurrence::Recurrence;

/// A running cron timer.
pub struct CronTimer {
    /// Timer ID.
    id: String,

    /// Parsed schedule.
    recurrence: Recurrence,

    /// Stops the timer loop when cancelled.
    cancel: CancellationToken,

    /// Fire count.
    fire_count: Arc<AtomicU64>,

    /// Timer loop task.
    handle: JoinHandle<()>,
}

impl CronTimer {
    /// Start a timer.
    ///
    /// # Arguments
    ///
    /// * `id` - Timer identifier, used in logs
    /// * `recurrence` - When to fire
    /// * `cancel` - Cancelling this token stops the timer
    /// * `tracker` - Firings are spawned on this tracker
    /// * `on_fire` - Creates the future run for each firing
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(
        id: impl Into<String>,
        recurrence: Recurrence,
        cancel: CancellationToken,
        tracker: TaskTracker,
        on_fire: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = id.into();
        let fire_count = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(run_timer(
            id.clone(),
            recurrence.clone(),
            cancel.clone(),
            tracker,
            fire_count.clone(),
            on_fire,
        ));

        Self {
            id,
            recurrence,
            cancel,
            fire_count,
            handle,
        }
    }

    /// Check if the timer is still scheduling firings.
    pub fn is_valid(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }

    /// Number of firings so far.
    pub fn fire_count(&self) -> u64 {
        self.fire_count.load(Ordering::Relaxed)
    }

    /// Get the next scheduled time.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        if !self.is_valid() {
            return None;
        }
        self.recurrence.next()
    }

    /// Cancel the timer. After cancellation no more firings are scheduled.
    pub fn cancel(&self) {
        self.cancel.cancel();
        debug!("CronTimer {} cancelled", self.id);
    }

    /// Wait for the timer loop to exit. Only returns once the timer is cancelled
    /// or the schedule has no upcoming time.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::warn!("CronTimer {} panicked: {}", self.id, e);
            }
        }
    }
}

async fn run_timer<F, Fut>(
    id: String,
    recurrence: Recurrence,
    cancel: CancellationToken,
    tracker: TaskTracker,
    fire_count: Arc<AtomicU64>,
    on_fire: F,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    debug!("CronTimer {} started ({})", id, recurrence.expression());
    let mut last_fire: Option<DateTime<Utc>> = None;

    loop {
        // Never hand out the same fire time twice, even if the wall clock lags
        // the monotonic clock used by `sleep`.
        let now = Utc::now();
        let after = match last_fire {
            Some(last) if last > now => last,
            _ => now,
        };

        let Some(next) = recurrence.next_after(&after) else {
            debug!("CronTimer {} has no upcoming schedule", id);
            break;
        };

        let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!("CronTimer {} scheduled for {}", id, next.to_rfc3339());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("CronTimer {} stopped", id);
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        last_fire = Some(next);
        fire_count.fetch_add(1, Ordering::Relaxed);
        tracker.spawn(on_fire());
    }
}

#[cfg(test)]
#[path = "cron_timer_tests.rs"]
mod tests;
