//! Renderer abstraction for browser-driven page interaction.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). A context is
//! one exclusive browser page; it is never shared between concurrent runs.

pub mod chromium;
pub mod scripts;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// HTTP status of the main document, when the browser observed one.
    pub status: Option<u16>,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

impl NavigationResult {
    /// A 2xx response was observed.
    pub fn is_ok(&self) -> bool {
        matches!(self.status, Some(s) if (200..300).contains(&s))
    }
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab).
///
/// Every selector lookup is fallible: target pages are arbitrary. The
/// provided methods are built on `execute_js`; backends may override them.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL, waiting for the load to settle, with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Capture the full page as PNG bytes.
    async fn screenshot_png(&self) -> Result<Vec<u8>>;
    /// Click the element, then type `text` one character at a time.
    async fn type_text(&self, selector: &str, text: &str, per_key_delay: Duration) -> Result<()>;
    /// Assign local files to a file input.
    async fn set_input_files(&self, selector: &str, files: &[String]) -> Result<()>;
    /// Click the element matching `selector`.
    async fn click(&self, selector: &str) -> Result<()>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;

    /// Whether an element matches and is rendered visibly.
    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let v = self.execute_js(&scripts::is_visible(selector)).await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    /// Whether any element matches.
    async fn exists(&self, selector: &str) -> Result<bool> {
        let v = self.execute_js(&scripts::exists(selector)).await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    /// Empty a text control's value.
    async fn clear_value(&self, selector: &str) -> Result<()> {
        script_success(self.execute_js(&scripts::clear_value(selector)).await?, selector)
    }

    /// Choose a `<select>` option by value (falling back to visible text).
    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        script_success(
            self.execute_js(&scripts::select_option(selector, value)).await?,
            selector,
        )
    }

    /// Check or uncheck a checkbox or radio.
    async fn set_checked(&self, selector: &str, checked: bool) -> Result<()> {
        script_success(
            self.execute_js(&scripts::set_checked(selector, checked)).await?,
            selector,
        )
    }

    /// Scroll the element into the middle of the viewport.
    async fn scroll_into_view(&self, selector: &str) -> Result<()> {
        self.execute_js(&scripts::scroll_into_view(selector)).await?;
        Ok(())
    }

    /// Find a visible button whose text contains `text` (case-insensitive),
    /// tag it, and return a selector that targets it.
    async fn tag_button_with_text(&self, text: &str) -> Result<Option<String>> {
        let v = self.execute_js(&scripts::tag_button_with_text(text)).await?;
        Ok(v.as_str().map(String::from))
    }
}

fn script_success(value: serde_json::Value, selector: &str) -> Result<()> {
    let ok = value
        .as_object()
        .and_then(|o| o.get("success"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        let reason = value
            .as_object()
            .and_then(|o| o.get("reason"))
            .and_then(|v| v.as_str())
            .unwrap_or("element not found");
        anyhow::bail!("{reason}: {selector}")
    }
}

/// A renderer used when Chromium is unavailable.
///
/// Every context request fails, so runs end as `SessionUnavailable`
/// instead of crashing the scheduler.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("Browser not available"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_status_classification() {
        let mut nav = NavigationResult {
            final_url: "https://example.com".into(),
            status: Some(200),
            load_time_ms: 10,
        };
        assert!(nav.is_ok());
        nav.status = Some(500);
        assert!(!nav.is_ok());
        nav.status = None;
        assert!(!nav.is_ok());
    }

    #[test]
    fn test_script_success_parsing() {
        assert!(script_success(serde_json::json!({"success": true}), "#a").is_ok());
        let err = script_success(serde_json::json!({"success": false, "reason": "no option"}), "#a")
            .unwrap_err();
        assert_eq!(err.to_string(), "no option: #a");
        assert!(script_success(serde_json::Value::Null, "#a").is_err());
    }

    #[tokio::test]
    async fn test_noop_renderer_refuses_contexts() {
        let r = NoopRenderer;
        assert!(r.new_context().await.is_err());
        assert_eq!(r.active_contexts(), 0);
    }
}
