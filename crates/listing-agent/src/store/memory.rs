//! In-process job store.

use super::{is_claimable, JobStore};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use listing_core::{
    is_fresh_eligible, is_retry_eligible, retry_order, AttemptOutcome, JobId, StatusUpdate,
    SubmissionJob, SubmissionStatus,
};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, SubmissionJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs currently in a given status.
    pub async fn count_status(&self, status: SubmissionStatus) -> usize {
        self.jobs
            .lock()
            .await
            .values()
            .filter(|j| j.status == status)
            .count()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: SubmissionJob) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            bail!("job {} already exists", job.id);
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<SubmissionJob>> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<SubmissionJob>> {
        let mut all: Vec<_> = self.jobs.lock().await.values().cloned().collect();
        all.sort_by_key(|j| j.created_at);
        Ok(all)
    }

    async fn fetch_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Vec<SubmissionJob>> {
        let mut eligible: Vec<_> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|j| is_fresh_eligible(j, now, cooldown))
            .cloned()
            .collect();
        eligible.sort_by_key(|j| j.created_at);
        eligible.truncate(limit);
        Ok(eligible)
    }

    async fn fetch_retryable(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Vec<SubmissionJob>> {
        let mut eligible: Vec<_> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|j| is_retry_eligible(j, now, cooldown))
            .cloned()
            .collect();
        eligible.sort_by(retry_order);
        eligible.truncate(limit);
        Ok(eligible)
    }

    async fn claim(&self, id: JobId, now: DateTime<Utc>) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(&id) {
            Some(job) if is_claimable(job) => {
                job.status = SubmissionStatus::InProgress;
                job.updated_at = now;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => bail!("job {id} not found"),
        }
    }

    async fn record_attempt(
        &self,
        id: JobId,
        outcome: AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Result<SubmissionJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or_else(|| anyhow!("job {id} not found"))?;
        job.record_attempt(outcome, now);
        Ok(job.clone())
    }

    async fn update_status(
        &self,
        id: JobId,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<SubmissionJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or_else(|| anyhow!("job {id} not found"))?;
        job.apply_status(&update, now);
        Ok(job.clone())
    }
}
