//! Execution events.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobId;

/// Store-assigned event identifier.
pub type EventId = i64;

/// State of one trigger attempt.
///
/// A normal firing moves `Created -> Running -> {Success | Failed | Canceled}`.
/// A firing skipped because the previous one is still in flight moves
/// `Created -> Pending -> Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Created,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl EventState {
    /// Stored name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::Created => "created",
            EventState::Pending => "pending",
            EventState::Running => "running",
            EventState::Success => "success",
            EventState::Failed => "failed",
            EventState::Canceled => "canceled",
        }
    }

    /// Whether the attempt has concluded.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventState::Success | EventState::Failed | EventState::Canceled
        )
    }

    /// Classify an HTTP status: `[200, 300)` succeeds, everything else fails.
    pub fn from_status_code(status_code: u16) -> Self {
        if (200..300).contains(&status_code) {
            EventState::Success
        } else {
            EventState::Failed
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown event state name.
#[derive(Debug, Error)]
#[error("Unknown event state: {0}")]
pub struct ParseEventStateError(pub String);

impl FromStr for EventState {
    type Err = ParseEventStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(EventState::Created),
            "pending" => Ok(EventState::Pending),
            "running" => Ok(EventState::Running),
            "success" => Ok(EventState::Success),
            "failed" => Ok(EventState::Failed),
            "canceled" => Ok(EventState::Canceled),
            other => Err(ParseEventStateError(other.to_string())),
        }
    }
}

/// What the endpoint answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl ResponseSnapshot {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        EventState::from_status_code(self.status_code) == EventState::Success
    }

    /// Terminal state this response produces.
    pub fn outcome(&self) -> EventState {
        EventState::from_status_code(self.status_code)
    }

    /// Serialize to the stored text form.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse the stored text form.
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// An event that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub job_id: JobId,
    pub state: EventState,
    pub created_at: DateTime<Utc>,
}

impl NewEvent {
    /// A fresh `created` event stamped now.
    pub fn created(job_id: JobId) -> Self {
        Self {
            job_id,
            state: EventState::Created,
            created_at: Utc::now(),
        }
    }
}

/// A stored event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub job_id: JobId,
    pub state: EventState,
    /// Serialized [`ResponseSnapshot`], if the endpoint answered.
    pub response: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Decode the stored response snapshot.
    pub fn response_snapshot(&self) -> Option<ResponseSnapshot> {
        self.response
            .as_deref()
            .and_then(|text| ResponseSnapshot::from_text(text).ok())
    }
}
