//! CLI subcommand implementations for the listing-agent binary.

pub mod detect_cmd;
pub mod jobs_cmd;
pub mod run_cmd;
pub mod submit_cmd;

use crate::activity::ActivityLog;
use crate::automation::{PageAutomation, ScreenshotStore};
use crate::config::AgentConfig;
use crate::demo::DemoSimulator;
use crate::detection::FormDetectionService;
use crate::executor::{SubmissionExecutor, SubmissionPipeline};
use crate::mapping::FieldMapper;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{NoopRenderer, Renderer};
use crate::scheduler::Scheduler;
use crate::store::{JobStore, SqliteJobStore};
use anyhow::{Context, Result};
use listing_core::JobId;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Store, pipeline and browser wired from configuration.
pub struct Runtime {
    pub store: Arc<dyn JobStore>,
    pub pipeline: Arc<dyn SubmissionPipeline>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl Runtime {
    /// Build the runtime. Without Chromium the real pipeline still runs,
    /// but every job ends with a session failure.
    pub async fn build(config: &AgentConfig) -> Result<Self> {
        let store: Arc<dyn JobStore> = Arc::new(open_store(config)?);

        if config.demo_mode {
            info!("demo mode: submissions are simulated");
            return Ok(Self {
                store,
                pipeline: Arc::new(DemoSimulator::new(1.0)),
                renderer: None,
            });
        }

        let renderer: Arc<dyn Renderer> =
            match ChromiumRenderer::launch(config.chromium_path.as_deref(), config.browser_headless)
                .await
            {
                Ok(r) => {
                    info!("Chromium renderer initialized");
                    Arc::new(r)
                }
                Err(e) => {
                    warn!("Failed to initialize Chromium: {e:#}");
                    warn!("Submissions will fail until a browser is available");
                    Arc::new(NoopRenderer)
                }
            };

        let detection = Arc::new(FormDetectionService::from_settings(&config.providers));
        info!(provider = detection.provider_name(), "form detection ready");
        let engine = PageAutomation::new(
            detection,
            FieldMapper::new(),
            ScreenshotStore::new(config.upload_dir.clone()),
            config.timings.clone(),
        );
        Ok(Self {
            store,
            pipeline: Arc::new(SubmissionExecutor::new(Arc::clone(&renderer), engine)),
            renderer: Some(renderer),
        })
    }

    pub fn scheduler(&self, config: &AgentConfig) -> Result<Scheduler> {
        let activity = ActivityLog::open(config.activity_log_path())?;
        Ok(Scheduler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.pipeline),
            config.scheduler.clone(),
        )
        .with_activity(Arc::new(activity)))
    }

    pub async fn shutdown(&self) {
        if let Some(renderer) = &self.renderer {
            if let Err(e) = renderer.shutdown().await {
                warn!("browser shutdown failed: {e:#}");
            }
        }
    }
}

pub fn open_store(config: &AgentConfig) -> Result<SqliteJobStore> {
    SqliteJobStore::open(&config.db_path)
}

pub fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.trim()
        .parse()
        .with_context(|| format!("invalid job id: {raw}"))
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
