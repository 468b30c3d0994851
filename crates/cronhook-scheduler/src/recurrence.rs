//! Seconds-precision cron expressions.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::SchedulerError;

/// Number of fields in an expression: `sec min hour day-of-month month day-of-week`.
pub const FIELD_COUNT: usize = 6;

/// A parsed six-field cron expression.
///
/// Examples:
/// - `"*/10 * * * * *"` - every 10 seconds
/// - `"0 */5 * * * *"` - every 5 minutes
/// - `"0 0 9 * * MON-FRI"` - 9 AM on weekdays
#[derive(Debug, Clone)]
pub struct Recurrence {
    expression: String,
    schedule: Schedule,
}

impl Recurrence {
    /// Parse an expression. Anything but exactly six fields is rejected, including
    /// the optional year field the underlying grammar would otherwise accept.
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let expression = expression.trim();
        let fields = expression.split_whitespace().count();
        if fields != FIELD_COUNT {
            return Err(SchedulerError::InvalidRecurrenceExpression {
                expression: expression.to_string(),
                reason: format!(
                    "expected {FIELD_COUNT} fields (sec min hour day month weekday), found {fields}"
                ),
            });
        }

        let schedule = Schedule::from_str(expression).map_err(|e| {
            SchedulerError::InvalidRecurrenceExpression {
                expression: expression.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    /// The expression as given.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }

    /// Next fire time from now.
    pub fn next(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }
}
