//! `listing-agent submit <id>`: run one job immediately.

use crate::cli::{parse_job_id, print_json, Runtime};
use crate::config::AgentConfig;
use anyhow::Result;

pub async fn run(config: &AgentConfig, id: &str, json: bool) -> Result<()> {
    let id = parse_job_id(id)?;
    let runtime = Runtime::build(config).await?;
    let scheduler = runtime.scheduler(config)?;

    let result = scheduler.run_job_now(id).await;
    runtime.shutdown().await;
    let job = result?;

    if json {
        return print_json(&job);
    }
    println!("  Job {}: {}", job.id, job.status);
    println!("  Attempts: {}/{}", job.attempt_count, job.max_attempts);
    if let Some(err) = &job.error_message {
        println!("  Error: {err}");
    }
    if let Some(path) = &job.screenshot_path {
        println!("  Screenshot: {path}");
    }
    Ok(())
}
