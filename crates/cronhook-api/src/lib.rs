//! # cronhook API
//!
//! Admin HTTP API over the schedule registry and the job store.
//!
//! Jobs are persisted before they are started, and stopped before they are
//! deleted, so the registry never fires a definition that is not stored.

pub mod error;
pub mod http;
pub mod server;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use http::routes::create_router;
pub use server::ApiServer;
pub use state::AppState;
