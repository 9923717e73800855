//! `listing-agent detect <url>`: load a page and print the detected form.

use crate::cli::print_json;
use crate::config::AgentConfig;
use crate::detection::FormDetectionService;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{RenderContext, Renderer};
use anyhow::{bail, Context, Result};
use base64::Engine as _;
use listing_core::FormDetectionResult;

pub async fn run(config: &AgentConfig, url: &str) -> Result<()> {
    let renderer =
        ChromiumRenderer::launch(config.chromium_path.as_deref(), config.browser_headless).await?;
    let detection = FormDetectionService::from_settings(&config.providers);
    eprintln!("  Detecting form on {url} using {}...", detection.provider_name());

    let mut ctx = renderer.new_context().await?;
    let result = detect_on_page(ctx.as_mut(), &detection, url, config.browser_timeout_ms).await;
    if let Err(e) = ctx.close().await {
        tracing::warn!("failed to close browser context: {e:#}");
    }
    renderer.shutdown().await?;

    print_json(&result?)
}

async fn detect_on_page(
    ctx: &mut dyn RenderContext,
    detection: &FormDetectionService,
    url: &str,
    timeout_ms: u64,
) -> Result<FormDetectionResult> {
    let nav = ctx.navigate(url, timeout_ms).await?;
    if !nav.is_ok() {
        bail!("page returned status {:?}", nav.status);
    }
    let png = ctx.screenshot_png().await.context("screenshot failed")?;
    let html = ctx.get_html().await?;
    let screenshot = base64::engine::general_purpose::STANDARD.encode(png);
    Ok(detection.detect(&screenshot, &html, &nav.final_url).await)
}
