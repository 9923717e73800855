//! Job persistence used by the scheduler.
//!
//! Each method is a single atomically-visible write or read. Eligibility
//! rules live in `listing_core::eligibility` so every backend agrees.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use listing_core::{AttemptOutcome, JobId, StatusUpdate, SubmissionJob};

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: SubmissionJob) -> Result<()>;

    async fn get(&self, id: JobId) -> Result<Option<SubmissionJob>>;

    /// All jobs, oldest first.
    async fn list(&self) -> Result<Vec<SubmissionJob>>;

    /// PENDING jobs eligible for an attempt, oldest created first.
    async fn fetch_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Vec<SubmissionJob>>;

    /// FAILED jobs eligible for retry, oldest attempt first.
    async fn fetch_retryable(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Vec<SubmissionJob>>;

    /// Move a PENDING or FAILED job with attempts left to IN_PROGRESS.
    ///
    /// Returns `false` when another claimant got there first or the job is
    /// no longer claimable.
    async fn claim(&self, id: JobId, now: DateTime<Utc>) -> Result<bool>;

    /// Count an attempt and append its record to the job's log.
    async fn record_attempt(
        &self,
        id: JobId,
        outcome: AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Result<SubmissionJob>;

    async fn update_status(
        &self,
        id: JobId,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<SubmissionJob>;
}

pub(crate) fn is_claimable(job: &SubmissionJob) -> bool {
    use listing_core::SubmissionStatus::{Failed, Pending};
    matches!(job.status, Pending | Failed) && job.attempt_count < job.max_attempts
}
