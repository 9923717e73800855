//! Submission executor: one browser context per run, always released.

use crate::automation::PageAutomation;
use crate::renderer::Renderer;
use async_trait::async_trait;
use futures::FutureExt;
use listing_core::{
    FormDetectionResult, ProductSnapshot, RunResult, Step, StepLog, StepStatus, SubmissionError,
    SubmissionJob,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything a run needs, detached from the job record.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub url: String,
    pub directory_name: String,
    pub product: ProductSnapshot,
    pub logo_path: Option<String>,
    pub cached_schema: Option<FormDetectionResult>,
}

impl SubmissionRequest {
    pub fn for_job(job: &SubmissionJob) -> Self {
        Self {
            url: job.directory.target_url().to_string(),
            directory_name: job.directory.name.clone(),
            product: job.product.clone(),
            logo_path: job.product.logo_path.clone(),
            cached_schema: job.directory.form_schema.clone(),
        }
    }
}

/// The capability the scheduler drives: execute one submission.
///
/// Implementations return a result for every outcome and never panic
/// across this boundary.
#[async_trait]
pub trait SubmissionPipeline: Send + Sync {
    async fn execute(&self, request: &SubmissionRequest) -> RunResult;
}

/// Real pipeline: a Chromium context driven by [`PageAutomation`].
pub struct SubmissionExecutor {
    renderer: Arc<dyn Renderer>,
    engine: PageAutomation,
}

impl SubmissionExecutor {
    pub fn new(renderer: Arc<dyn Renderer>, engine: PageAutomation) -> Self {
        Self { renderer, engine }
    }
}

#[async_trait]
impl SubmissionPipeline for SubmissionExecutor {
    async fn execute(&self, request: &SubmissionRequest) -> RunResult {
        let mut ctx = match self.renderer.new_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(url = %request.url, error = %e, "could not open browser context");
                let mut run = RunResult::new(&request.url);
                let err = SubmissionError::SessionUnavailable(e.to_string());
                run.log_entry(StepLog::new(Step::Error, StepStatus::Failed).with_note(err.to_string()));
                run.fail(&err);
                return run;
            }
        };

        info!(directory = %request.directory_name, url = %request.url, "starting submission");
        let outcome = AssertUnwindSafe(self.engine.run(ctx.as_mut(), request))
            .catch_unwind()
            .await;

        let run = match outcome {
            Ok(run) => run,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(url = %request.url, panic = %message, "submission panicked");
                let mut run = RunResult::new(&request.url);
                let err = SubmissionError::Crashed(message);
                run.log_entry(StepLog::new(Step::Error, StepStatus::Failed).with_note(err.to_string()));
                run.fail(&err);
                run.screenshot_path = self.engine.capture(ctx.as_ref(), "error", &mut run).await.1;
                run
            }
        };

        if let Err(e) = ctx.close().await {
            warn!(error = %e, "failed to close browser context");
        }
        info!(
            directory = %request.directory_name,
            success = run.success,
            error = run.error.as_deref().unwrap_or_default(),
            "submission finished"
        );
        run
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
