//! Run-level failure taxonomy.
//!
//! The `Display` strings are what operators see as a job's `error_message`.

use serde::{Deserialize, Serialize};

/// A failure that aborts a submission run early.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SubmissionError {
    #[error("Failed to load page")]
    NavigationFailure { reason: String },

    #[error("No submission form found")]
    FormNotFound,

    #[error("CAPTCHA detected, requires manual intervention")]
    CaptchaDetected { marker: String },

    #[error("Could not find submit button")]
    SubmitControlNotFound,

    #[error("Failed to click submit button")]
    SubmitClickFailure { selector: String, reason: String },

    #[error("Detected error phrase: {phrase}")]
    OutcomeRejected { phrase: String },

    #[error("Failed to open browser session: {0}")]
    SessionUnavailable(String),

    #[error("Submission crashed: {0}")]
    Crashed(String),
}

impl SubmissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmissionError::NavigationFailure { .. } => ErrorKind::NavigationFailure,
            SubmissionError::FormNotFound => ErrorKind::FormNotFound,
            SubmissionError::CaptchaDetected { .. } => ErrorKind::CaptchaDetected,
            SubmissionError::SubmitControlNotFound => ErrorKind::SubmitControlNotFound,
            SubmissionError::SubmitClickFailure { .. } => ErrorKind::SubmitClickFailure,
            SubmissionError::OutcomeRejected { .. } => ErrorKind::OutcomeRejected,
            SubmissionError::SessionUnavailable(_) => ErrorKind::SessionUnavailable,
            SubmissionError::Crashed(_) => ErrorKind::Crashed,
        }
    }

    /// Extra context that is logged but kept out of the operator message.
    pub fn detail(&self) -> Option<&str> {
        match self {
            SubmissionError::NavigationFailure { reason } => Some(reason),
            SubmissionError::CaptchaDetected { marker } => Some(marker),
            SubmissionError::SubmitClickFailure { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Serializable classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NavigationFailure,
    FormNotFound,
    CaptchaDetected,
    SubmitControlNotFound,
    SubmitClickFailure,
    OutcomeRejected,
    SessionUnavailable,
    Crashed,
}

impl ErrorKind {
    /// Whether another automated attempt could plausibly succeed.
    ///
    /// A CAPTCHA needs a human; everything else may be transient.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::CaptchaDetected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NavigationFailure => "navigation_failure",
            ErrorKind::FormNotFound => "form_not_found",
            ErrorKind::CaptchaDetected => "captcha_detected",
            ErrorKind::SubmitControlNotFound => "submit_control_not_found",
            ErrorKind::SubmitClickFailure => "submit_click_failure",
            ErrorKind::OutcomeRejected => "outcome_rejected",
            ErrorKind::SessionUnavailable => "session_unavailable",
            ErrorKind::Crashed => "crashed",
        }
    }
}
