//! Core errors.

use thiserror::Error;

use crate::event::EventId;
use crate::job::JobId;

/// Errors raised by the data model and the stores.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The job definition violates an invariant.
    #[error("Invalid job definition: {0}")]
    InvalidDefinition(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Event not found.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// The backing store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_definition_display() {
        let err = CoreError::InvalidDefinition("name is required".to_string());
        assert!(err.to_string().contains("name is required"));
    }

    #[test]
    fn test_not_found_display() {
        assert_eq!(CoreError::JobNotFound(7).to_string(), "Job not found: 7");
        assert_eq!(CoreError::EventNotFound(9).to_string(), "Event not found: 9");
    }

    #[test]
    fn test_persistence_display() {
        let err = CoreError::Persistence("disk full".to_string());
        assert!(err.to_string().starts_with("Persistence error"));
    }
}
