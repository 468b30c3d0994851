//! Scheduler and dispatch errors.

use thiserror::Error;

use cronhook_core::JobId;

/// Errors returned synchronously by the registry.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The job already has an active timer.
    #[error("Schedule with id {0} already running")]
    AlreadyRunning(JobId),

    /// The job has no active timer.
    #[error("Schedule with id {0} is not running")]
    NotRunning(JobId),

    /// The cron expression does not parse.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidRecurrenceExpression { expression: String, reason: String },
}

/// Errors from building or sending one webhook request.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The stored header text is not a JSON object of strings.
    #[error("Error parsing headers: {0}")]
    HeaderParse(String),

    /// Method, URL or headers cannot form a request.
    #[error("Error creating request: {0}")]
    RequestBuild(String),

    /// Network failure, timeout or cancellation.
    #[error("Error executing request: {0}")]
    Dispatch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_error_display() {
        assert!(SchedulerError::AlreadyRunning(4).to_string().contains("already running"));
        assert!(SchedulerError::NotRunning(4).to_string().contains("not running"));

        let err = SchedulerError::InvalidRecurrenceExpression {
            expression: "* * *".to_string(),
            reason: "expected 6 fields".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("* * *"));
        assert!(display.contains("expected 6 fields"));
    }

    #[test]
    fn test_webhook_error_display() {
        assert!(WebhookError::HeaderParse("eof".to_string())
            .to_string()
            .starts_with("Error parsing headers"));
        assert!(WebhookError::RequestBuild("bad url".to_string())
            .to_string()
            .starts_with("Error creating request"));
        assert!(WebhookError::Dispatch("refused".to_string())
            .to_string()
            .starts_with("Error executing request"));
    }
}
