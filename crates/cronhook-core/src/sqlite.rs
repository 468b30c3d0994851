//! SQLite store implementation.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::error::CoreError;
use crate::event::{Event, EventId, EventState, NewEvent};
use crate::job::{JobDefinition, JobId, NewJob};
use crate::schema::init_schema;
use crate::store::{EventRecorder, EventUpdate, JobStore};

const JOB_COLUMNS: &str =
    "id, name, endpoint, method, cron, body, headers, created_at, last_run_at";

const EVENT_COLUMNS: &str = "id, job_id, state, response, error, created_at";

/// SQLite-backed store for jobs and events.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;

        Self::with_connection(conn).await
    }

    /// Open (or create) a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Persistence(e.to_string()))?;
        }
        debug!("Opening SQLite store at {:?}", path);

        let conn = Connection::open(path)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;

        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> Result<Self, CoreError> {
        conn.call(|conn| Ok(init_schema(conn)?))
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;

        Ok(Self { conn })
    }
}

fn parse_time(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobDefinition> {
    let created_at: String = row.get(7)?;
    let last_run_at: Option<String> = row.get(8)?;

    Ok(JobDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        endpoint: row.get(2)?,
        method: row.get(3)?,
        cron: row.get(4)?,
        body: row.get(5)?,
        headers: row.get(6)?,
        created_at: parse_time(7, &created_at)?,
        last_run_at: last_run_at.as_deref().map(|t| parse_time(8, t)).transpose()?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let state: String = row.get(2)?;
    let created_at: String = row.get(5)?;

    Ok(Event {
        id: row.get(0)?,
        job_id: row.get(1)?,
        state: state
            .parse::<EventState>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        response: row.get(3)?,
        error: row.get(4)?,
        created_at: parse_time(5, &created_at)?,
    })
}

#[async_trait]
impl EventRecorder for SqliteStore {
    async fn create_event(&self, event: &NewEvent) -> Result<EventId, CoreError> {
        let job_id = event.job_id;
        let state = event.state.as_str();
        let created_at = event.created_at.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO events (job_id, state, created_at) VALUES (?1, ?2, ?3)",
                    params![job_id, state, created_at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))
    }

    async fn update_event(&self, id: EventId, update: EventUpdate) -> Result<(), CoreError> {
        let state = update.state.as_str();
        let response = update.response.map(|r| r.to_text());
        let error = update.error;

        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE events SET state = ?1,
                     response = COALESCE(?2, response),
                     error = COALESCE(?3, error)
                     WHERE id = ?4",
                    params![state, response, error, id],
                )?;
                Ok(changed)
            })
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;

        if changed == 0 {
            return Err(CoreError::EventNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn create_job(&self, job: NewJob) -> Result<JobDefinition, CoreError> {
        job.validate()?;
        let created_at = Utc::now();
        let pending = job.into_definition(0, created_at);
        let row = pending.clone();

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO jobs (name, endpoint, method, cron, body, headers, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        row.name,
                        row.endpoint,
                        row.method,
                        row.cron,
                        row.body,
                        row.headers,
                        row.created_at.to_rfc3339()
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;

        Ok(JobDefinition { id, ..pending })
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobDefinition>, CoreError> {
        self.conn
            .call(move |conn| {
                let job = conn
                    .query_row(
                        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                        [id],
                        job_from_row,
                    )
                    .optional()?;
                Ok(job)
            })
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))
    }

    async fn list_jobs(&self) -> Result<Vec<JobDefinition>, CoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY id"))?;
                let jobs = stmt
                    .query_map([], job_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(jobs)
            })
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))
    }

    async fn delete_job(&self, id: JobId) -> Result<bool, CoreError> {
        self.conn
            .call(move |conn| {
                let deleted = conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))
    }

    async fn update_last_run(&self, id: JobId, at: DateTime<Utc>) -> Result<(), CoreError> {
        let at = at.to_rfc3339();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE jobs SET last_run_at = ?1 WHERE id = ?2",
                    params![at, id],
                )?;
                Ok(changed)
            })
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;

        if changed == 0 {
            return Err(CoreError::JobNotFound(id));
        }
        Ok(())
    }

    async fn list_events(&self, job_id: JobId) -> Result<Vec<Event>, CoreError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events WHERE job_id = ?1 ORDER BY id"
                ))?;
                let events = stmt
                    .query_map([job_id], event_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(events)
            })
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
