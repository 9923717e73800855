//! Pickup eligibility and post-run status transitions.
//!
//! Stores use these predicates so every backend agrees on which jobs a
//! scheduler pass may claim.

use crate::error::ErrorKind;
use crate::types::{SubmissionJob, SubmissionStatus};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;

/// PENDING with attempts left. A requeued job (already attempted) also
/// waits out the cool-down.
pub fn is_fresh_eligible(job: &SubmissionJob, now: DateTime<Utc>, cooldown: Duration) -> bool {
    job.status == SubmissionStatus::Pending
        && job.attempt_count < job.max_attempts
        && (job.attempt_count == 0 || cooled_down(job.last_attempt_at, now, cooldown))
}

/// FAILED with attempts left and the cool-down elapsed (or never attempted).
pub fn is_retry_eligible(job: &SubmissionJob, now: DateTime<Utc>, cooldown: Duration) -> bool {
    job.status == SubmissionStatus::Failed
        && job.attempt_count < job.max_attempts
        && cooled_down(job.last_attempt_at, now, cooldown)
}

fn cooled_down(last: Option<DateTime<Utc>>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    match last {
        None => true,
        Some(at) => now - at >= cooldown,
    }
}

/// Oldest attempt first, never-attempted first of all.
pub fn retry_order(a: &SubmissionJob, b: &SubmissionJob) -> Ordering {
    match (a.last_attempt_at, b.last_attempt_at) {
        (None, None) => a.created_at.cmp(&b.created_at),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

/// Status a job moves to once an attempt has been recorded.
///
/// `attempt_count` is the post-increment value.
pub fn next_status_after(
    success: bool,
    error_kind: Option<ErrorKind>,
    attempt_count: u32,
    max_attempts: u32,
) -> SubmissionStatus {
    if success {
        return SubmissionStatus::Submitted;
    }
    if matches!(error_kind, Some(kind) if !kind.is_retryable()) {
        return SubmissionStatus::RequiresReview;
    }
    if attempt_count >= max_attempts {
        SubmissionStatus::Failed
    } else {
        SubmissionStatus::Pending
    }
}
