//! Simulated submission pipeline for demos (`DEMO_MODE`).
//!
//! No browser and no provider calls: canned form schemas per directory
//! family, randomized step delays and a 90% success rate. Produces the
//! same `RunResult` shape as the real executor.

use crate::automation::outcome::UNCONFIRMED_NOTE;
use crate::executor::{SubmissionPipeline, SubmissionRequest};
use crate::mapping::FieldMapper;
use async_trait::async_trait;
use chrono::Utc;
use listing_core::{
    FieldType, FormDetectionResult, FormField, PipelineState, RunResult, Step, StepLog,
    StepStatus, SubmissionError,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

const SUCCESS_RATE: f64 = 0.9;

const SUCCESS_MESSAGES: &[&str] = &[
    "Thank you for your submission! We'll review it within 24-48 hours.",
    "Your product has been submitted successfully. You'll receive a confirmation email.",
    "Submission received! Our team will review and publish within 3-5 business days.",
    "Thanks for submitting! Your listing is now pending review.",
    "Success! Your product has been added to our review queue.",
];

#[derive(Debug, Clone, Copy)]
enum DemoFailure {
    Captcha,
    RateLimited,
    AccountRequired,
}

const FAILURES: &[DemoFailure] = &[
    DemoFailure::Captcha,
    DemoFailure::RateLimited,
    DemoFailure::AccountRequired,
];

/// Directory families with distinct canned forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoSchema {
    LaunchPlatform,
    BetaList,
    SaasCatalog,
    Generic,
}

impl DemoSchema {
    pub fn for_directory(name: &str, url: &str) -> Self {
        let name = name.to_lowercase();
        let url = url.to_lowercase();
        if url.contains("producthunt") || name.contains("product hunt") {
            DemoSchema::LaunchPlatform
        } else if url.contains("betalist") {
            DemoSchema::BetaList
        } else if url.contains("saashub") || name.contains("saas") {
            DemoSchema::SaasCatalog
        } else {
            DemoSchema::Generic
        }
    }

    fn fields(self) -> Vec<FormField> {
        use FieldType::*;
        let layout: &[(&str, FieldType, &str, bool)] = match self {
            DemoSchema::LaunchPlatform => &[
                ("product_name", Text, "Product Name", true),
                ("tagline", Text, "Tagline", true),
                ("description", Textarea, "Description", true),
                ("website_url", Url, "Website URL", true),
                ("category", Select, "Category", true),
                ("logo", File, "Logo", false),
            ],
            DemoSchema::BetaList => &[
                ("startup_name", Text, "Startup Name", true),
                ("url", Url, "URL", true),
                ("pitch", Textarea, "One-line Pitch", true),
                ("description", Textarea, "Description", true),
                ("email", Email, "Contact Email", true),
            ],
            DemoSchema::SaasCatalog => &[
                ("tool_name", Text, "Tool Name", true),
                ("website", Url, "Website", true),
                ("short_description", Text, "Short Description", true),
                ("long_description", Textarea, "Full Description", true),
                ("pricing", Select, "Pricing Model", true),
                ("category", Select, "Category", true),
            ],
            DemoSchema::Generic => &[
                ("name", Text, "Product/Company Name", true),
                ("url", Url, "Website URL", true),
                ("description", Textarea, "Description", true),
                ("email", Email, "Contact Email", true),
                ("category", Select, "Category", false),
            ],
        };
        layout.iter()
            .map(|(name, field_type, label, required)| FormField {
                name: name.to_string(),
                field_type: *field_type,
                label: Some(label.to_string()),
                placeholder: None,
                required: *required,
                selector: format!("[name='{name}']"),
                options: None,
            })
            .collect()
    }

    fn selectors(self) -> (&'static str, &'static str) {
        match self {
            DemoSchema::LaunchPlatform => ("form.product-submission", "button[type='submit']"),
            DemoSchema::BetaList => ("form#startup-form", "#submit-btn"),
            DemoSchema::SaasCatalog => ("form.tool-submission-form", "button.submit-tool"),
            DemoSchema::Generic => ("form", "button[type='submit']"),
        }
    }
}

/// Pipeline that simulates submissions.
pub struct DemoSimulator {
    mapper: FieldMapper,
    /// Multiplier on every simulated delay; `0.0` disables them.
    speed: f64,
    rng: Mutex<StdRng>,
}

impl DemoSimulator {
    pub fn new(speed: f64) -> Self {
        Self {
            mapper: FieldMapper::new(),
            speed: speed.max(0.0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic simulator for tests.
    pub fn seeded(seed: u64, speed: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..Self::new(speed)
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut guard = match self.rng.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    async fn delay(&self, min_secs: f64, max_secs: f64) {
        if self.speed == 0.0 {
            return;
        }
        let secs = self.with_rng(|rng| rng.gen_range(min_secs..max_secs)) * self.speed;
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }
}

#[async_trait]
impl SubmissionPipeline for DemoSimulator {
    async fn execute(&self, request: &SubmissionRequest) -> RunResult {
        let mut run = RunResult::new(&request.url);
        info!(directory = %request.directory_name, url = %request.url, "demo submission started");

        run.log(Step::Navigate, StepStatus::Started);
        self.delay(1.0, 2.5).await;
        run.log(Step::Navigate, StepStatus::Success);
        run.final_state = PipelineState::Navigated;

        self.delay(1.5, 3.0).await;
        let schema = DemoSchema::for_directory(&request.directory_name, &request.url);
        let (form_selector, submit_selector) = schema.selectors();
        let detection = FormDetectionResult {
            url: request.url.clone(),
            form_found: true,
            form_selector: Some(form_selector.to_string()),
            fields: schema.fields(),
            submit_button_selector: Some(submit_selector.to_string()),
            confidence: self.with_rng(|rng| rng.gen_range(0.85..0.98)),
        };
        run.log(Step::DetectForm, StepStatus::Success);
        run.final_state = PipelineState::FormDetected;

        let plan = self.mapper.plan(
            &detection.fields,
            &request.product,
            request.logo_path.as_deref(),
        );
        for (selector, _) in &plan {
            self.delay(0.3, 0.8).await;
            run.fill_results.insert(selector.clone(), true);
        }
        let mut fill = StepLog::new(Step::FillForm, StepStatus::Success);
        fill.filled = Some(plan.len());
        fill.failed = Some(0);
        run.log_entry(fill);
        run.filled_fields = plan.into_iter().collect();
        run.detected_fields = Some(detection);
        run.final_state = PipelineState::FieldsFilled;

        run.log(Step::Submit, StepStatus::Started);
        self.delay(1.0, 2.0).await;

        let slug = request.directory_name.to_lowercase().replace(' ', "_");
        run.screenshot_path = Some(format!(
            "screenshots/demo_{slug}_{}.png",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));

        let succeeded = self.with_rng(|rng| rng.gen_bool(SUCCESS_RATE));
        if succeeded {
            let message = self.with_rng(|rng| SUCCESS_MESSAGES.choose(rng).copied())
                .unwrap_or(UNCONFIRMED_NOTE);
            run.log_entry(StepLog::new(Step::Submit, StepStatus::Success).with_note(message));
            run.outcome_note = Some(message.to_string());
            run.success = true;
            run.final_state = PipelineState::Done;
        } else {
            let failure = self
                .with_rng(|rng| FAILURES.choose(rng).copied())
                .unwrap_or(DemoFailure::RateLimited);
            let (err, message) = match failure {
                DemoFailure::Captcha => (
                    SubmissionError::CaptchaDetected {
                        marker: ".g-recaptcha".into(),
                    },
                    None,
                ),
                DemoFailure::RateLimited => (
                    SubmissionError::OutcomeRejected {
                        phrase: "rate limit".into(),
                    },
                    Some("Rate limit reached, try again in 24 hours"),
                ),
                DemoFailure::AccountRequired => (
                    SubmissionError::OutcomeRejected {
                        phrase: "verification required".into(),
                    },
                    Some("Account verification required"),
                ),
            };
            run.log_entry(StepLog::new(Step::Submit, StepStatus::Failed));
            run.fail(&err);
            if let Some(message) = message {
                run.error = Some(message.to_string());
            }
        }

        info!(directory = %request.directory_name, success = run.success, "demo submission finished");
        run
    }
}
