//! # cronhook core
//!
//! Data model and persistence for recurring webhook jobs.
//!
//! - [`JobDefinition`] / [`NewJob`]: stored webhook schedules
//! - [`Event`] / [`EventState`]: one record per trigger attempt
//! - [`JobStore`] / [`EventRecorder`]: persistence seams
//! - [`MemoryStore`] / [`SqliteStore`]: the two store backends

pub mod error;
pub mod event;
pub mod job;
pub mod sqlite;
pub mod store;

mod schema;

pub use error::CoreError;
pub use event::{Event, EventId, EventState, NewEvent, ParseEventStateError, ResponseSnapshot};
pub use job::{JobDefinition, JobId, NewJob, parse_header_text, serialize_headers};
pub use sqlite::SqliteStore;
pub use store::{EventRecorder, EventUpdate, JobStore, MemoryStore, Store};
