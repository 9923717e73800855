//! Worker scheduler.
//!
//! One polling loop hands eligible jobs to independently running tasks. A
//! semaphore holds the concurrency ceiling for the whole process; a job is
//! claimed in the store (IN_PROGRESS) before its task is spawned, and each
//! outcome is written back as its own store call.

use crate::activity::ActivityLog;
use crate::executor::{panic_message, SubmissionPipeline, SubmissionRequest};
use crate::store::JobStore;
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use listing_core::{
    next_status_after, AttemptOutcome, JobId, RunResult, StatusUpdate, SubmissionJob,
    SubmissionStatus,
};
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Scheduler knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrent: usize,
    pub poll_interval: Duration,
    pub retry_cooldown: Duration,
    /// Humanized delay between job launches within one pass.
    pub pacing_min: Duration,
    pub pacing_max: Duration,
    /// Extra sleep after a poll pass that failed.
    pub error_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            poll_interval: Duration::from_secs(30),
            retry_cooldown: Duration::from_secs(3600),
            pacing_min: Duration::from_secs(30),
            pacing_max: Duration::from_secs(90),
            error_backoff: Duration::from_secs(60),
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn JobStore>,
    pipeline: Arc<dyn SubmissionPipeline>,
    config: SchedulerConfig,
    slots: Arc<Semaphore>,
    in_flight: Mutex<HashSet<JobId>>,
    stop_tx: watch::Sender<bool>,
    activity: Option<Arc<ActivityLog>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        pipeline: Arc<dyn SubmissionPipeline>,
        config: SchedulerConfig,
    ) -> Self {
        let max = config.max_concurrent.max(1);
        let (stop_tx, _) = watch::channel(false);
        Self {
            store,
            pipeline,
            config: SchedulerConfig {
                max_concurrent: max,
                ..config
            },
            slots: Arc::new(Semaphore::new(max)),
            in_flight: Mutex::new(HashSet::new()),
            stop_tx,
            activity: None,
        }
    }

    pub fn with_activity(mut self, log: Arc<ActivityLog>) -> Self {
        self.activity = Some(log);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Jobs currently executing.
    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().len()
    }

    /// Start the polling loop. Runs until [`stop`](Self::stop).
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut stop_rx = self.stop_tx.subscribe();
        tokio::spawn(async move {
            info!(
                max_concurrent = this.config.max_concurrent,
                poll_secs = this.config.poll_interval.as_secs(),
                "scheduler started"
            );
            loop {
                if *stop_rx.borrow() {
                    break;
                }
                let mut wait = this.config.poll_interval;
                match this.run_pass().await {
                    Ok(0) => debug!("scheduler pass: nothing started"),
                    Ok(started) => info!(started, "scheduler pass complete"),
                    Err(e) => {
                        error!(error = %e, "scheduler pass failed");
                        wait += this.config.error_backoff;
                    }
                }
                tokio::select! {
                    _ = stop_rx.changed() => {}
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            info!("scheduler stopped");
        })
    }

    /// Stop polling. Jobs already running finish on their own.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Wait until no job is executing.
    pub async fn wait_idle(&self) {
        let all = self.config.max_concurrent as u32;
        if let Ok(permits) = self.slots.acquire_many(all).await {
            drop(permits);
        }
    }

    /// One poll: fetch up to the free capacity and launch each job.
    ///
    /// Returns how many jobs were started.
    pub async fn run_pass(self: &Arc<Self>) -> Result<usize> {
        let free = self.slots.available_permits();
        if free == 0 {
            debug!("concurrency ceiling reached, skipping pass");
            return Ok(0);
        }

        let now = Utc::now();
        let cooldown = chrono::Duration::from_std(self.config.retry_cooldown)
            .map_err(|e| anyhow!("invalid retry cool-down: {e}"))?;
        let mut batch = self.store.fetch_pending(free, now, cooldown).await?;
        if batch.len() < free {
            let retries = self
                .store
                .fetch_retryable(free - batch.len(), now, cooldown)
                .await?;
            batch.extend(retries);
        }

        let mut stop_rx = self.stop_tx.subscribe();
        let mut started = 0;
        for job in batch {
            if *stop_rx.borrow() {
                break;
            }
            if started > 0 && !self.pace(&mut stop_rx).await {
                break;
            }
            if self.dispatch(&job).await? {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Claim and execute one job immediately, without pacing.
    pub async fn run_job_now(&self, id: JobId) -> Result<SubmissionJob> {
        let Ok(_permit) = Arc::clone(&self.slots).try_acquire_owned() else {
            bail!(
                "concurrency ceiling of {} reached, try again later",
                self.config.max_concurrent
            );
        };
        let job = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("job {id} not found"))?;
        if !self.begin(id, job.status).await? {
            bail!("job {id} is not eligible to run ({})", job.status);
        }
        self.process(id, job.attempt_count).await;
        self.end(id);
        self.store
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("job {id} not found"))
    }

    /// Sleep a random pacing delay. `false` if stopped before or meanwhile.
    async fn pace(&self, stop_rx: &mut watch::Receiver<bool>) -> bool {
        let delay = {
            let (min, max) = (self.config.pacing_min, self.config.pacing_max);
            if max > min {
                rand::thread_rng().gen_range(min..=max)
            } else {
                min
            }
        };
        if *stop_rx.borrow() {
            return false;
        }
        if delay.is_zero() {
            return true;
        }
        debug!(delay_ms = delay.as_millis() as u64, "pacing before next job");
        tokio::select! {
            _ = stop_rx.changed() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn dispatch(self: &Arc<Self>, job: &SubmissionJob) -> Result<bool> {
        let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
            return Ok(false);
        };
        let (id, attempts_before) = (job.id, job.attempt_count);
        if !self.begin(id, job.status).await? {
            return Ok(false);
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            this.process(id, attempts_before).await;
            this.end(id);
        });
        Ok(true)
    }

    /// Mark in flight and claim in the store. `false` if someone else has it.
    async fn begin(&self, id: JobId, from: SubmissionStatus) -> Result<bool> {
        if !self.lock_in_flight().insert(id) {
            return Ok(false);
        }
        match self.store.claim(id, Utc::now()).await {
            Ok(true) => {
                info!(job_id = %id, from = %from, "job claimed");
                self.note(id, "status", &format!("{} -> in_progress", from.as_str()), false);
                Ok(true)
            }
            Ok(false) => {
                self.end(id);
                Ok(false)
            }
            Err(e) => {
                self.end(id);
                Err(e)
            }
        }
    }

    fn end(&self, id: JobId) {
        self.lock_in_flight().remove(&id);
    }

    /// Execute a claimed job and write its outcome. Never fails.
    ///
    /// `attempts_before` is the attempt count the job was claimed with.
    async fn process(&self, id: JobId, attempts_before: u32) {
        let job = match self.store.get(id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %id, "claimed job disappeared");
                return;
            }
            Err(e) => {
                self.crash(id, true, &format!("failed to load job: {e}")).await;
                return;
            }
        };
        let request = SubmissionRequest::for_job(&job);
        info!(
            job_id = %id,
            directory = %job.directory.name,
            attempt = attempts_before + 1,
            "job started"
        );

        let pipeline = Arc::clone(&self.pipeline);
        let run = tokio::spawn(async move { pipeline.execute(&request).await }).await;
        let run = match run {
            Ok(run) => run,
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic().as_ref())
                } else {
                    join_err.to_string()
                };
                self.crash(id, true, &message).await;
                return;
            }
        };

        let job = match self
            .store
            .record_attempt(id, AttemptOutcome::from_run(&run), Utc::now())
            .await
        {
            Ok(job) => job,
            Err(e) => {
                self.crash(id, true, &format!("failed to record attempt: {e}")).await;
                return;
            }
        };
        if let Err(e) = self.settle(id, &run, &job).await {
            self.crash(id, false, &format!("failed to update status: {e}")).await;
        }
    }

    /// Write the status that follows a recorded attempt.
    async fn settle(&self, id: JobId, run: &RunResult, job: &SubmissionJob) -> Result<()> {
        let next = next_status_after(run.success, run.error_kind, job.attempt_count, job.max_attempts);

        let mut update = StatusUpdate::status(next).with_error(run.error.clone());
        if next == SubmissionStatus::Submitted {
            update = update.with_screenshot(run.screenshot_path.clone());
        }
        self.store.update_status(id, update, Utc::now()).await?;

        let transition = format!("in_progress -> {}", next.as_str());
        match next {
            SubmissionStatus::Submitted => {
                info!(job_id = %id, attempt = job.attempt_count, "job submitted");
                self.note(id, "status", &transition, false);
            }
            _ => {
                let reason = run.error.as_deref().unwrap_or("unknown failure");
                warn!(
                    job_id = %id,
                    attempt = job.attempt_count,
                    max_attempts = job.max_attempts,
                    status = %next,
                    error = reason,
                    "job attempt failed"
                );
                self.note(id, "attempt", reason, true);
                self.note(id, "status", &transition, false);
            }
        }
        Ok(())
    }

    /// Record a job that died outside the pipeline as FAILED.
    ///
    /// `unrecorded` is set when this execution has not yet appended its
    /// attempt; a crashed attempt is appended in its place.
    async fn crash(&self, id: JobId, unrecorded: bool, message: &str) {
        error!(job_id = %id, error = message, "job crashed");
        self.note(id, "crash", message, true);

        let now = Utc::now();
        let mut error_message = Some(message.to_string());
        if unrecorded {
            let outcome = AttemptOutcome::crashed(message);
            error_message = outcome.error.clone();
            if let Err(e) = self.store.record_attempt(id, outcome, now).await {
                error!(job_id = %id, error = %e, "failed to record crashed attempt");
            }
        }

        let update = StatusUpdate::status(SubmissionStatus::Failed).with_error(error_message);
        if let Err(e) = self.store.update_status(id, update, now).await {
            error!(job_id = %id, error = %e, "failed to mark crashed job failed");
        }
    }

    fn note(&self, id: JobId, action: &str, message: &str, is_error: bool) {
        if let Some(log) = &self.activity {
            if is_error {
                log.error(id, action, message);
            } else {
                log.info(id, action, message);
            }
        }
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<JobId>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
