//! # cronhook scheduler
//!
//! In-process engine that fires webhook jobs on their cron schedules.
//!
//! ## Components
//!
//! - [`ScheduleRegistry`]: the set of active jobs, one timer and one
//!   cancellation scope per job
//! - [`CronTimer`]: per-job timer task driven by a [`Recurrence`]
//! - [`JobRunner`]: one firing end to end (event, dispatch, terminal state)
//! - [`WebhookDispatcher`]: builds and sends one HTTP request
//!
//! ## Overlap policy
//!
//! A firing that arrives while the previous firing of the same job is still in
//! flight is skipped: its event is recorded `pending` then `canceled`, and no
//! request is sent.

pub mod cron_timer;
pub mod dispatcher;
pub mod error;
pub mod recurrence;
pub mod registry;
pub mod runner;

pub use cron_timer::CronTimer;
pub use dispatcher::{WebhookDispatcher, WebhookRequest};
pub use error::{SchedulerError, WebhookError};
pub use recurrence::Recurrence;
pub use registry::{ActiveJobStatus, ScheduleRegistry};
pub use runner::{Firing, InFlight, InFlightGuard, JobRunner};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;
