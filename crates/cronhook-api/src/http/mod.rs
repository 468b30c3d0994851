//! HTTP layer.

pub mod health;
pub mod routes;
pub mod schedules;
