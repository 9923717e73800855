//! `listing-agent run`: drive the scheduler until Ctrl-C.

use crate::cli::Runtime;
use crate::config::AgentConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub async fn run(config: &AgentConfig) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let scheduler = Arc::new(runtime.scheduler(config)?);

    eprintln!(
        "  Scheduler running ({} concurrent, polling every {}s). Press Ctrl-C to stop.",
        config.scheduler.max_concurrent,
        config.scheduler.poll_interval.as_secs()
    );
    let handle = scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("received shutdown signal");
    scheduler.stop();
    handle.await.context("scheduler loop panicked")?;

    let running = scheduler.in_flight();
    if running > 0 {
        eprintln!("  Waiting for {running} running job(s) to finish...");
    }
    scheduler.wait_idle().await;
    runtime.shutdown().await;
    eprintln!("  Scheduler stopped.");
    Ok(())
}
