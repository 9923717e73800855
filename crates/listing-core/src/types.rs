//! Core data types for jobs, detected forms and run results.

use crate::error::{ErrorKind, SubmissionError};
use crate::product::ProductSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identity of a submission job.
pub type JobId = Uuid;

/// Lifecycle state of a submission job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    InProgress,
    Submitted,
    Failed,
    /// Blocked on something automation cannot clear (a CAPTCHA).
    RequiresReview,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::InProgress => "in_progress",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Failed => "failed",
            SubmissionStatus::RequiresReview => "requires_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubmissionStatus::Pending),
            "in_progress" => Some(SubmissionStatus::InProgress),
            "submitted" => Some(SubmissionStatus::Submitted),
            "failed" => Some(SubmissionStatus::Failed),
            "requires_review" => Some(SubmissionStatus::RequiresReview),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of form control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Email,
    Url,
    Textarea,
    Select,
    File,
    Checkbox,
    Radio,
}

impl FieldType {
    /// Lenient parse for model output: anything unrecognised is `Text`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => FieldType::Email,
            "url" => FieldType::Url,
            "textarea" => FieldType::Textarea,
            "select" => FieldType::Select,
            "file" => FieldType::File,
            "checkbox" => FieldType::Checkbox,
            "radio" => FieldType::Radio,
            _ => FieldType::Text,
        }
    }

    /// Map an `<input type=…>` attribute. `None` for controls that carry no
    /// user data (hidden, submit, button, reset, image).
    pub fn from_input_type(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hidden" | "submit" | "button" | "reset" | "image" => None,
            other => Some(Self::parse_lenient(other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::Textarea => "textarea",
            FieldType::Select => "select",
            FieldType::File => "file",
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
        }
    }
}

/// A single detected form control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub field_type: FieldType,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub required: bool,
    /// CSS selector used to target the control.
    pub selector: String,
    /// Choices, for `select` fields only.
    pub options: Option<Vec<String>>,
}

/// Canonical output of form detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDetectionResult {
    pub url: String,
    pub form_found: bool,
    pub form_selector: Option<String>,
    pub fields: Vec<FormField>,
    pub submit_button_selector: Option<String>,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f32,
}

impl FormDetectionResult {
    /// The zero-confidence result every detection failure degrades to.
    pub fn not_found(url: &str) -> Self {
        Self {
            url: url.to_string(),
            form_found: false,
            form_selector: None,
            fields: Vec::new(),
            submit_button_selector: None,
            confidence: 0.0,
        }
    }

    /// A form was found and it has something to fill.
    pub fn is_usable(&self) -> bool {
        self.form_found && !self.fields.is_empty()
    }
}

/// Where a product should be listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryDescriptor {
    pub name: String,
    pub url: String,
    /// Direct link to the submission form, when known.
    #[serde(default)]
    pub submission_url: Option<String>,
    /// A previous detection result reused to skip re-detection.
    #[serde(default)]
    pub form_schema: Option<FormDetectionResult>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub requires_account: bool,
    /// Rolling success rate, 0–100.
    #[serde(default)]
    pub success_rate: u8,
}

impl DirectoryDescriptor {
    /// The page the automation should load.
    pub fn target_url(&self) -> &str {
        self.submission_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.url)
    }
}

/// A product value assigned to a detected field, keyed by selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedField {
    pub field_name: String,
    pub field_type: FieldType,
    pub value: String,
}

/// Named step of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Navigate,
    Screenshot,
    DetectForm,
    FillForm,
    CaptchaCheck,
    Submit,
    Verify,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Success,
    Failed,
    Blocked,
    Cached,
    Unknown,
}

/// One structured log entry of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    pub step: Step,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
}

impl StepLog {
    pub fn new(step: Step, status: StepStatus) -> Self {
        Self {
            step,
            status,
            note: None,
            filled: None,
            failed: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// States of the page automation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Start,
    Navigated,
    FormDetected,
    FieldsFilled,
    CaptchaChecked,
    Submitted,
    ResultChecked,
    Done,
    Error,
}

/// The uniform result of one submission run, however it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub url: String,
    pub detected_fields: Option<FormDetectionResult>,
    /// Selector → value mapping that was attempted.
    pub filled_fields: BTreeMap<String, MappedField>,
    /// Selector → whether the fill succeeded.
    pub fill_results: BTreeMap<String, bool>,
    pub screenshot_path: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Set when the run succeeded without an explicit confirmation.
    pub outcome_note: Option<String>,
    pub logs: Vec<StepLog>,
    pub final_state: PipelineState,
}

impl RunResult {
    pub fn new(url: &str) -> Self {
        Self {
            success: false,
            url: url.to_string(),
            detected_fields: None,
            filled_fields: BTreeMap::new(),
            fill_results: BTreeMap::new(),
            screenshot_path: None,
            error: None,
            error_kind: None,
            outcome_note: None,
            logs: Vec::new(),
            final_state: PipelineState::Start,
        }
    }

    pub fn log(&mut self, step: Step, status: StepStatus) {
        self.logs.push(StepLog::new(step, status));
    }

    pub fn log_entry(&mut self, entry: StepLog) {
        self.logs.push(entry);
    }

    /// Move to the error terminal with a classified failure.
    pub fn fail(&mut self, err: &SubmissionError) {
        self.success = false;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
        self.final_state = PipelineState::Error;
    }

    /// Whether a given step was ever logged.
    pub fn attempted(&self, step: Step) -> bool {
        self.logs.iter().any(|l| l.step == step)
    }
}

/// Immutable record of one executed attempt, appended to the job log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt index.
    pub attempt: u32,
    pub recorded_at: DateTime<Utc>,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub note: Option<String>,
    pub steps: Vec<StepLog>,
}

/// What a store needs to append an attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub note: Option<String>,
    pub steps: Vec<StepLog>,
    pub detected_fields: Option<FormDetectionResult>,
    pub filled_fields: Option<BTreeMap<String, MappedField>>,
}

impl AttemptOutcome {
    pub fn from_run(result: &RunResult) -> Self {
        Self {
            success: result.success,
            error_kind: result.error_kind,
            error: result.error.clone(),
            note: result.outcome_note.clone(),
            steps: result.logs.clone(),
            detected_fields: result.detected_fields.clone(),
            filled_fields: if result.filled_fields.is_empty() {
                None
            } else {
                Some(result.filled_fields.clone())
            },
        }
    }

    /// An attempt that died before the pipeline could report.
    pub fn crashed(message: &str) -> Self {
        let err = SubmissionError::Crashed(message.to_string());
        Self {
            success: false,
            error_kind: Some(err.kind()),
            error: Some(err.to_string()),
            note: None,
            steps: vec![StepLog::new(Step::Error, StepStatus::Failed).with_note(message)],
            detected_fields: None,
            filled_fields: None,
        }
    }
}

/// One (product, directory) submission lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionJob {
    pub id: JobId,
    pub product: ProductSnapshot,
    pub directory: DirectoryDescriptor,
    pub status: SubmissionStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    submission_log: Vec<AttemptRecord>,
    pub detected_fields: Option<FormDetectionResult>,
    pub filled_fields: Option<BTreeMap<String, MappedField>>,
    pub error_message: Option<String>,
    pub screenshot_path: Option<String>,
}

/// Default attempt budget for a new job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

impl SubmissionJob {
    /// Create a PENDING job.
    pub fn new(product: ProductSnapshot, directory: DirectoryDescriptor) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            product,
            directory,
            status: SubmissionStatus::Pending,
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: now,
            updated_at: now,
            last_attempt_at: None,
            submitted_at: None,
            submission_log: Vec::new(),
            detected_fields: None,
            filled_fields: None,
            error_message: None,
            screenshot_path: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// The ordered attempt history. Entries are never modified.
    pub fn submission_log(&self) -> &[AttemptRecord] {
        &self.submission_log
    }

    /// Rebuild a job from persisted parts.
    pub fn restore_log(mut self, log: Vec<AttemptRecord>) -> Self {
        self.submission_log = log;
        self
    }

    /// Count one executed attempt and append its record.
    ///
    /// Detection/fill snapshots are replaced only when the attempt produced
    /// them, so a crash does not wipe the previous snapshot.
    pub fn record_attempt(&mut self, outcome: AttemptOutcome, now: DateTime<Utc>) -> &AttemptRecord {
        self.attempt_count += 1;
        self.last_attempt_at = Some(now);
        self.updated_at = now;
        if outcome.detected_fields.is_some() {
            self.detected_fields = outcome.detected_fields;
        }
        if outcome.filled_fields.is_some() {
            self.filled_fields = outcome.filled_fields;
        }
        self.submission_log.push(AttemptRecord {
            attempt: self.attempt_count,
            recorded_at: now,
            success: outcome.success,
            error_kind: outcome.error_kind,
            error: outcome.error,
            note: outcome.note,
            steps: outcome.steps,
        });
        &self.submission_log[self.submission_log.len() - 1]
    }

    /// Apply a status write.
    pub fn apply_status(&mut self, update: &StatusUpdate, now: DateTime<Utc>) {
        self.status = update.status;
        self.updated_at = now;
        if update.status == SubmissionStatus::Submitted {
            self.submitted_at = Some(now);
            self.error_message = None;
        }
        if let Some(msg) = &update.error_message {
            self.error_message = Some(msg.clone());
        }
        if let Some(path) = &update.screenshot_path {
            self.screenshot_path = Some(path.clone());
        }
    }
}

/// A single atomically-visible status write.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: SubmissionStatus,
    pub error_message: Option<String>,
    pub screenshot_path: Option<String>,
}

impl StatusUpdate {
    pub fn status(status: SubmissionStatus) -> Self {
        Self {
            status,
            error_message: None,
            screenshot_path: None,
        }
    }

    pub fn with_error(mut self, message: Option<String>) -> Self {
        self.error_message = message;
        self
    }

    pub fn with_screenshot(mut self, path: Option<String>) -> Self {
        self.screenshot_path = path;
        self
    }
}
