//! The submission state machine.
//!
//! START → NAVIGATED → FORM_DETECTED → FIELDS_FILLED → CAPTCHA_CHECKED →
//! SUBMITTED → RESULT_CHECKED → DONE, with ERROR reachable from every
//! state. Only navigation, form detection, CAPTCHA and the submit control
//! abort a run; field fills fail individually.

use super::captcha;
use super::outcome::{self, Outcome, UNCONFIRMED_NOTE};
use super::{pause, EngineTimings, ScreenshotStore};
use crate::detection::FormDetectionService;
use crate::executor::SubmissionRequest;
use crate::mapping::FieldMapper;
use crate::renderer::RenderContext;
use anyhow::{bail, Result};
use base64::Engine as _;
use listing_core::{
    FieldType, FormDetectionResult, MappedField, PipelineState, RunResult, Step, StepLog,
    StepStatus, SubmissionError,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const VISIBILITY_POLL: Duration = Duration::from_millis(100);

/// How the engine looks for a submit control when detection gave none.
#[derive(Debug, Clone, Copy)]
enum SubmitProbe {
    Css(&'static str),
    Text(&'static str),
}

const SUBMIT_PROBES: &[SubmitProbe] = &[
    SubmitProbe::Css(r#"button[type="submit"]"#),
    SubmitProbe::Css(r#"input[type="submit"]"#),
    SubmitProbe::Text("Submit"),
    SubmitProbe::Text("Add"),
    SubmitProbe::Text("Create"),
    SubmitProbe::Text("Post"),
    SubmitProbe::Text("Send"),
    SubmitProbe::Css(".submit-btn"),
    SubmitProbe::Css(".btn-submit"),
    SubmitProbe::Css("#submit"),
    SubmitProbe::Css("#submit-btn"),
];

/// Drives one page through a submission. Holds no per-run state.
pub struct PageAutomation {
    detection: Arc<FormDetectionService>,
    mapper: FieldMapper,
    screenshots: ScreenshotStore,
    timings: EngineTimings,
}

impl PageAutomation {
    pub fn new(
        detection: Arc<FormDetectionService>,
        mapper: FieldMapper,
        screenshots: ScreenshotStore,
        timings: EngineTimings,
    ) -> Self {
        Self {
            detection,
            mapper,
            screenshots,
            timings,
        }
    }

    /// Run the whole pipeline. Always returns a result.
    pub async fn run(&self, ctx: &mut dyn RenderContext, request: &SubmissionRequest) -> RunResult {
        let mut run = RunResult::new(&request.url);
        if let Err(err) = self.drive(ctx, request, &mut run).await {
            warn!(
                url = %request.url,
                state = ?run.final_state,
                error = %err,
                detail = err.detail().unwrap_or_default(),
                "submission aborted"
            );
            let mut entry = StepLog::new(Step::Error, StepStatus::Failed).with_note(err.to_string());
            if let Some(detail) = err.detail() {
                entry.note = Some(format!("{err}: {detail}"));
            }
            run.log_entry(entry);
            run.fail(&err);
            // A rejected outcome already has its result screenshot.
            if !matches!(err, SubmissionError::OutcomeRejected { .. }) {
                if let Some(path) = self.capture(ctx, "error", &mut run).await.1 {
                    run.screenshot_path = Some(path);
                }
            }
        }
        run
    }

    async fn drive(
        &self,
        ctx: &mut dyn RenderContext,
        request: &SubmissionRequest,
        run: &mut RunResult,
    ) -> Result<(), SubmissionError> {
        self.navigate(ctx, &request.url, run).await?;

        let (png, path) = self.capture(ctx, "submission", run).await;
        run.screenshot_path = path;

        let detection = self.detect(ctx, request, png.as_deref(), run).await?;

        let plan = self.mapper.plan(
            &detection.fields,
            &request.product,
            request.logo_path.as_deref(),
        );
        run.filled_fields = plan.iter().cloned().collect();

        if let Some(form) = &detection.form_selector {
            if let Err(e) = ctx.scroll_into_view(form).await {
                debug!(selector = %form, error = %e, "could not scroll to form");
            }
        }
        self.fill_fields(ctx, &plan, run).await;

        self.check_captcha(ctx, run).await?;

        let submit = self.locate_submit(ctx, &detection).await.ok_or_else(|| {
            run.log(Step::Submit, StepStatus::Failed);
            SubmissionError::SubmitControlNotFound
        })?;
        self.submit(ctx, &submit, run).await?;

        self.verify(ctx, run).await
    }

    async fn navigate(
        &self,
        ctx: &mut dyn RenderContext,
        url: &str,
        run: &mut RunResult,
    ) -> Result<(), SubmissionError> {
        run.log(Step::Navigate, StepStatus::Started);
        info!(url, "navigating");
        let timeout_ms = self.timings.navigation_timeout.as_millis() as u64;

        let failure = match ctx.navigate(url, timeout_ms).await {
            Ok(nav) if nav.is_ok() => {
                debug!(url, load_time_ms = nav.load_time_ms, final_url = %nav.final_url, "page loaded");
                None
            }
            Ok(nav) => Some(match nav.status {
                Some(status) => format!("HTTP {status}"),
                None => "no response observed".to_string(),
            }),
            Err(e) => Some(e.to_string()),
        };

        if let Some(reason) = failure {
            run.log_entry(StepLog::new(Step::Navigate, StepStatus::Failed).with_note(reason.clone()));
            return Err(SubmissionError::NavigationFailure { reason });
        }

        run.log(Step::Navigate, StepStatus::Success);
        pause(self.timings.settle_after_load).await;
        advance(run, PipelineState::Navigated);
        Ok(())
    }

    async fn detect(
        &self,
        ctx: &mut dyn RenderContext,
        request: &SubmissionRequest,
        png: Option<&[u8]>,
        run: &mut RunResult,
    ) -> Result<FormDetectionResult, SubmissionError> {
        if let Some(cached) = request.cached_schema.as_ref().filter(|s| s.is_usable()) {
            info!(url = %request.url, fields = cached.fields.len(), "using cached form schema");
            run.log(Step::DetectForm, StepStatus::Cached);
            run.detected_fields = Some(cached.clone());
            advance(run, PipelineState::FormDetected);
            return Ok(cached.clone());
        }

        let html = ctx.get_html().await.unwrap_or_else(|e| {
            warn!(error = %e, "could not read page HTML");
            String::new()
        });
        let screenshot_b64 = png
            .map(|b| base64::engine::general_purpose::STANDARD.encode(b))
            .unwrap_or_default();

        let detection = self
            .detection
            .detect(&screenshot_b64, &html, &request.url)
            .await;
        run.detected_fields = Some(detection.clone());

        if !detection.is_usable() {
            run.log(Step::DetectForm, StepStatus::Failed);
            return Err(SubmissionError::FormNotFound);
        }

        info!(
            url = %request.url,
            fields = detection.fields.len(),
            confidence = detection.confidence,
            "form detected"
        );
        run.log(Step::DetectForm, StepStatus::Success);
        advance(run, PipelineState::FormDetected);
        Ok(detection)
    }

    async fn fill_fields(
        &self,
        ctx: &dyn RenderContext,
        plan: &[(String, MappedField)],
        run: &mut RunResult,
    ) {
        let mut filled = 0;
        let mut failed = 0;
        for (i, (selector, field)) in plan.iter().enumerate() {
            if i > 0 {
                pause(self.timings.field_pacing).await;
            }
            match self.fill_one(ctx, selector, field).await {
                Ok(()) => {
                    filled += 1;
                    run.fill_results.insert(selector.clone(), true);
                }
                Err(e) => {
                    failed += 1;
                    warn!(selector = %selector, field = %field.field_name, error = %e, "field fill failed");
                    run.fill_results.insert(selector.clone(), false);
                }
            }
        }

        info!(filled, failed, "form filled");
        let mut entry = StepLog::new(Step::FillForm, StepStatus::Success);
        entry.filled = Some(filled);
        entry.failed = Some(failed);
        run.log_entry(entry);
        advance(run, PipelineState::FieldsFilled);
    }

    async fn fill_one(&self, ctx: &dyn RenderContext, selector: &str, field: &MappedField) -> Result<()> {
        // File inputs are routinely styled away, so only presence is required.
        if field.field_type == FieldType::File {
            if !ctx.exists(selector).await? {
                bail!("file input not found");
            }
            return ctx.set_input_files(selector, &[field.value.clone()]).await;
        }

        self.wait_visible(ctx, selector).await?;
        match field.field_type {
            FieldType::Select => ctx.select_option(selector, &field.value).await,
            FieldType::Checkbox => ctx.set_checked(selector, is_truthy(&field.value)).await,
            FieldType::Radio => ctx.set_checked(selector, true).await,
            _ => {
                ctx.clear_value(selector).await?;
                ctx.type_text(selector, &field.value, self.timings.keystroke_delay)
                    .await
            }
        }
    }

    async fn wait_visible(&self, ctx: &dyn RenderContext, selector: &str) -> Result<()> {
        let started = Instant::now();
        loop {
            if ctx.is_visible(selector).await.unwrap_or(false) {
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= self.timings.element_wait {
                bail!("element not visible after {}ms", self.timings.element_wait.as_millis());
            }
            tokio::time::sleep(VISIBILITY_POLL.min(self.timings.element_wait - elapsed)).await;
        }
    }

    async fn check_captcha(&self, ctx: &dyn RenderContext, run: &mut RunResult) -> Result<(), SubmissionError> {
        if let Some(marker) = captcha::find_marker(ctx).await {
            warn!(marker, "CAPTCHA detected");
            run.log_entry(StepLog::new(Step::CaptchaCheck, StepStatus::Blocked).with_note(marker));
            return Err(SubmissionError::CaptchaDetected {
                marker: marker.to_string(),
            });
        }
        run.log(Step::CaptchaCheck, StepStatus::Success);
        advance(run, PipelineState::CaptchaChecked);
        Ok(())
    }

    async fn locate_submit(&self, ctx: &dyn RenderContext, detection: &FormDetectionResult) -> Option<String> {
        if let Some(sel) = &detection.submit_button_selector {
            if ctx.exists(sel).await.unwrap_or(false) {
                return Some(sel.clone());
            }
            debug!(selector = %sel, "detected submit selector not on page, probing");
        }

        for probe in SUBMIT_PROBES {
            match *probe {
                SubmitProbe::Css(sel) => {
                    if ctx.is_visible(sel).await.unwrap_or(false) {
                        return Some(sel.to_string());
                    }
                }
                SubmitProbe::Text(text) => {
                    if let Ok(Some(sel)) = ctx.tag_button_with_text(text).await {
                        return Some(sel);
                    }
                }
            }
        }
        None
    }

    async fn submit(&self, ctx: &dyn RenderContext, selector: &str, run: &mut RunResult) -> Result<(), SubmissionError> {
        run.log(Step::Submit, StepStatus::Started);
        info!(selector, "clicking submit");
        if let Err(e) = ctx.click(selector).await {
            run.log(Step::Submit, StepStatus::Failed);
            return Err(SubmissionError::SubmitClickFailure {
                selector: selector.to_string(),
                reason: e.to_string(),
            });
        }
        pause(self.timings.submit_settle).await;
        advance(run, PipelineState::Submitted);
        Ok(())
    }

    async fn verify(&self, ctx: &mut dyn RenderContext, run: &mut RunResult) -> Result<(), SubmissionError> {
        run.log(Step::Verify, StepStatus::Started);
        pause(self.timings.verify_settle).await;

        let url = ctx.get_url().await.unwrap_or_default();
        let html = ctx.get_html().await.unwrap_or_default();
        let verdict = outcome::classify(&url, &html);

        if let Some(path) = self.capture(ctx, "result", run).await.1 {
            run.screenshot_path = Some(path);
        }
        advance(run, PipelineState::ResultChecked);

        match verdict {
            Outcome::Confirmed(phrase) => {
                info!(phrase, "submission confirmed");
                run.log_entry(StepLog::new(Step::Submit, StepStatus::Success).with_note(phrase));
            }
            Outcome::Rejected(phrase) => {
                run.log_entry(StepLog::new(Step::Submit, StepStatus::Failed).with_note(phrase));
                return Err(SubmissionError::OutcomeRejected {
                    phrase: phrase.to_string(),
                });
            }
            Outcome::Unconfirmed => {
                info!("submission outcome unconfirmed");
                run.log_entry(StepLog::new(Step::Submit, StepStatus::Unknown).with_note(UNCONFIRMED_NOTE));
                run.outcome_note = Some(UNCONFIRMED_NOTE.to_string());
            }
        }

        run.success = true;
        advance(run, PipelineState::Done);
        Ok(())
    }

    /// Best-effort full-page capture: the PNG and its stored path.
    pub(crate) async fn capture(
        &self,
        ctx: &dyn RenderContext,
        label: &str,
        run: &mut RunResult,
    ) -> (Option<Vec<u8>>, Option<String>) {
        let png = match ctx.screenshot_png().await {
            Ok(png) => png,
            Err(e) => {
                warn!(label, error = %e, "screenshot failed");
                run.log_entry(StepLog::new(Step::Screenshot, StepStatus::Failed).with_note(label));
                return (None, None);
            }
        };
        let path = self.screenshots.save(label, &png).await;
        let status = if path.is_some() {
            StepStatus::Success
        } else {
            StepStatus::Failed
        };
        run.log_entry(StepLog::new(Step::Screenshot, status).with_note(label));
        (Some(png), path)
    }
}

fn advance(run: &mut RunResult, state: PipelineState) {
    debug!(from = ?run.final_state, to = ?state, "pipeline transition");
    run.final_state = state;
}

/// Checkbox values: "true", "1", "yes" (any case) check the box.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
