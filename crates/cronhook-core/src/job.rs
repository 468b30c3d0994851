//! Job definition.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Store-assigned job identifier.
pub type JobId = i64;

/// A stored webhook schedule.
///
/// Headers are kept in their serialized text form; they are only parsed when a
/// request is built, so a malformed header blob surfaces as a failed event
/// rather than a load error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Unique job ID.
    pub id: JobId,
    /// Human-readable name.
    pub name: String,
    /// Target URL.
    pub endpoint: String,
    /// HTTP method.
    pub method: String,
    /// Six-field cron expression (seconds first).
    pub cron: String,
    /// Request body sent verbatim.
    #[serde(default)]
    pub body: String,
    /// Header mapping serialized as a JSON object.
    #[serde(default = "default_header_text")]
    pub headers: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time the endpoint last answered.
    pub last_run_at: Option<DateTime<Utc>>,
}

fn default_header_text() -> String {
    "{}".to_string()
}

fn default_method() -> String {
    "POST".to_string()
}

/// Parse serialized header text. Empty text and `null` mean no headers.
pub fn parse_header_text(text: &str) -> Result<HashMap<String, String>, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let headers: Option<HashMap<String, String>> = serde_json::from_str(text)?;
    Ok(headers.unwrap_or_default())
}

/// Serialize a header mapping to its stored text form.
pub fn serialize_headers(headers: &HashMap<String, String>) -> String {
    serde_json::to_string(headers).unwrap_or_else(|_| default_header_text())
}

/// A job definition that has not been stored yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub cron: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl NewJob {
    /// Create a new job with the default method and no body or headers.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        cron: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            method: default_method(),
            cron: cron.into(),
            body: String::new(),
            headers: HashMap::new(),
        }
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Check the field-level invariants. The cron grammar is checked by the scheduler.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidDefinition("name is required".to_string()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(CoreError::InvalidDefinition("endpoint is required".to_string()));
        }
        if self.cron.trim().is_empty() {
            return Err(CoreError::InvalidDefinition("cron is required".to_string()));
        }
        Ok(())
    }

    /// Turn into a stored definition.
    pub fn into_definition(self, id: JobId, created_at: DateTime<Utc>) -> JobDefinition {
        let headers = serialize_headers(&self.headers);
        JobDefinition {
            id,
            name: self.name,
            endpoint: self.endpoint,
            method: self.method,
            cron: self.cron,
            body: self.body,
            headers,
            created_at,
            last_run_at: None,
        }
    }
}
