//! SQLite job store.
//!
//! Jobs live in one row each, with JSON columns for nested data. Attempt
//! records go to the insert-only `attempt_log` table; rows there are never
//! updated or deleted.

use super::JobStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use listing_core::{
    is_fresh_eligible, is_retry_eligible, retry_order, AttemptOutcome, AttemptRecord, JobId,
    StatusUpdate, SubmissionJob, SubmissionStatus,
};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    product TEXT NOT NULL,
    directory TEXT NOT NULL,
    status TEXT NOT NULL,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_attempt_at TEXT,
    submitted_at TEXT,
    detected_fields TEXT,
    filled_fields TEXT,
    error_message TEXT,
    screenshot_path TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE TABLE IF NOT EXISTS attempt_log (
    job_id TEXT NOT NULL REFERENCES jobs(id),
    attempt INTEGER NOT NULL,
    record TEXT NOT NULL,
    PRIMARY KEY (job_id, attempt)
);
";

const JOB_COLUMNS: &str = "id, product, directory, status, attempt_count, max_attempts, \
    created_at, updated_at, last_attempt_at, submitted_at, detected_fields, filled_fields, \
    error_message, screenshot_path";

pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open job database: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to create job tables")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow!("job database lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .context("job database task failed")?
    }

    async fn candidates(&self, status: SubmissionStatus) -> Result<Vec<SubmissionJob>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {JOB_COLUMNS} FROM jobs \
                 WHERE status = ?1 AND attempt_count < max_attempts ORDER BY created_at"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params![status.as_str()], row_to_parts)?;
            let mut jobs = Vec::new();
            for parts in rows {
                jobs.push(assemble(conn, parts?)?);
            }
            Ok(jobs)
        })
        .await
    }
}

/// Raw column values of one `jobs` row.
struct JobRow {
    id: String,
    product: String,
    directory: String,
    status: String,
    attempt_count: u32,
    max_attempts: u32,
    created_at: String,
    updated_at: String,
    last_attempt_at: Option<String>,
    submitted_at: Option<String>,
    detected_fields: Option<String>,
    filled_fields: Option<String>,
    error_message: Option<String>,
    screenshot_path: Option<String>,
}

fn row_to_parts(row: &Row<'_>) -> rusqlite::Result<JobRow> {
    Ok(JobRow {
        id: row.get(0)?,
        product: row.get(1)?,
        directory: row.get(2)?,
        status: row.get(3)?,
        attempt_count: row.get(4)?,
        max_attempts: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        last_attempt_at: row.get(8)?,
        submitted_at: row.get(9)?,
        detected_fields: row.get(10)?,
        filled_fields: row.get(11)?,
        error_message: row.get(12)?,
        screenshot_path: row.get(13)?,
    })
}

fn assemble(conn: &Connection, row: JobRow) -> Result<SubmissionJob> {
    let mut job = SubmissionJob::new(
        serde_json::from_str(&row.product).context("bad product column")?,
        serde_json::from_str(&row.directory).context("bad directory column")?,
    );
    job.id = Uuid::parse_str(&row.id).context("bad job id")?;
    job.status = SubmissionStatus::parse(&row.status)
        .ok_or_else(|| anyhow!("unknown job status {:?}", row.status))?;
    job.attempt_count = row.attempt_count;
    job.max_attempts = row.max_attempts;
    job.created_at = parse_ts(&row.created_at)?;
    job.updated_at = parse_ts(&row.updated_at)?;
    job.last_attempt_at = row.last_attempt_at.as_deref().map(parse_ts).transpose()?;
    job.submitted_at = row.submitted_at.as_deref().map(parse_ts).transpose()?;
    job.detected_fields = row
        .detected_fields
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("bad detected_fields column")?;
    job.filled_fields = row
        .filled_fields
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("bad filled_fields column")?;
    job.error_message = row.error_message;
    job.screenshot_path = row.screenshot_path;

    let mut stmt =
        conn.prepare("SELECT record FROM attempt_log WHERE job_id = ?1 ORDER BY attempt")?;
    let log = stmt
        .query_map(rusqlite::params![row.id], |r| r.get::<_, String>(0))?
        .map(|raw| -> Result<AttemptRecord> { Ok(serde_json::from_str(&raw?)?) })
        .collect::<Result<Vec<_>>>()?;
    Ok(job.restore_log(log))
}

fn load(conn: &Connection, id: JobId) -> Result<Option<SubmissionJob>> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
    let row = conn
        .query_row(&sql, rusqlite::params![id.to_string()], row_to_parts)
        .optional()?;
    row.map(|r| assemble(conn, r)).transpose()
}

fn load_required(conn: &Connection, id: JobId) -> Result<SubmissionJob> {
    load(conn, id)?.ok_or_else(|| anyhow!("job {id} not found"))
}

/// Write every mutable column of `job`.
fn write_job(conn: &Connection, job: &SubmissionJob) -> Result<()> {
    conn.execute(
        "UPDATE jobs SET status = ?2, attempt_count = ?3, max_attempts = ?4, updated_at = ?5,
             last_attempt_at = ?6, submitted_at = ?7, detected_fields = ?8, filled_fields = ?9,
             error_message = ?10, screenshot_path = ?11
         WHERE id = ?1",
        rusqlite::params![
            job.id.to_string(),
            job.status.as_str(),
            job.attempt_count,
            job.max_attempts,
            fmt_ts(job.updated_at),
            job.last_attempt_at.map(fmt_ts),
            job.submitted_at.map(fmt_ts),
            job.detected_fields.as_ref().map(serde_json::to_string).transpose()?,
            job.filled_fields.as_ref().map(serde_json::to_string).transpose()?,
            job.error_message,
            job.screenshot_path,
        ],
    )?;
    Ok(())
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp {raw:?}"))?
        .with_timezone(&Utc))
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: SubmissionJob) -> Result<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO jobs ({JOB_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                rusqlite::params![
                    job.id.to_string(),
                    serde_json::to_string(&job.product)?,
                    serde_json::to_string(&job.directory)?,
                    job.status.as_str(),
                    job.attempt_count,
                    job.max_attempts,
                    fmt_ts(job.created_at),
                    fmt_ts(job.updated_at),
                    job.last_attempt_at.map(fmt_ts),
                    job.submitted_at.map(fmt_ts),
                    job.detected_fields.as_ref().map(serde_json::to_string).transpose()?,
                    job.filled_fields.as_ref().map(serde_json::to_string).transpose()?,
                    job.error_message,
                    job.screenshot_path,
                ],
            )
            .with_context(|| format!("failed to insert job {}", job.id))?;
            for record in job.submission_log() {
                tx.execute(
                    "INSERT INTO attempt_log (job_id, attempt, record) VALUES (?1, ?2, ?3)",
                    rusqlite::params![job.id.to_string(), record.attempt, serde_json::to_string(record)?],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: JobId) -> Result<Option<SubmissionJob>> {
        self.with_conn(move |conn| load(conn, id)).await
    }

    async fn list(&self) -> Result<Vec<SubmissionJob>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_parts)?;
            let mut jobs = Vec::new();
            for parts in rows {
                jobs.push(assemble(conn, parts?)?);
            }
            Ok(jobs)
        })
        .await
    }

    async fn fetch_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Vec<SubmissionJob>> {
        let mut jobs = self.candidates(SubmissionStatus::Pending).await?;
        jobs.retain(|j| is_fresh_eligible(j, now, cooldown));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn fetch_retryable(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Vec<SubmissionJob>> {
        let mut jobs = self.candidates(SubmissionStatus::Failed).await?;
        jobs.retain(|j| is_retry_eligible(j, now, cooldown));
        jobs.sort_by(retry_order);
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn claim(&self, id: JobId, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE jobs SET status = ?2, updated_at = ?3
                 WHERE id = ?1 AND status IN (?4, ?5) AND attempt_count < max_attempts",
                rusqlite::params![
                    id.to_string(),
                    SubmissionStatus::InProgress.as_str(),
                    fmt_ts(now),
                    SubmissionStatus::Pending.as_str(),
                    SubmissionStatus::Failed.as_str(),
                ],
            )?;
            if changed == 0 {
                // Missing jobs are an error, unclaimable ones are not.
                load_required(conn, id)?;
            }
            Ok(changed == 1)
        })
        .await
    }

    async fn record_attempt(
        &self,
        id: JobId,
        outcome: AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Result<SubmissionJob> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut job = load_required(&tx, id)?;
            let record = job.record_attempt(outcome, now).clone();
            tx.execute(
                "INSERT INTO attempt_log (job_id, attempt, record) VALUES (?1, ?2, ?3)",
                rusqlite::params![id.to_string(), record.attempt, serde_json::to_string(&record)?],
            )?;
            write_job(&tx, &job)?;
            tx.commit()?;
            Ok(job)
        })
        .await
    }

    async fn update_status(
        &self,
        id: JobId,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<SubmissionJob> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut job = load_required(&tx, id)?;
            job.apply_status(&update, now);
            write_job(&tx, &job)?;
            tx.commit()?;
            Ok(job)
        })
        .await
    }
}
