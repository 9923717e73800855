//! Shared fakes: a scripted browser page and a vision provider that is
//! never reachable, so detection always falls back to the HTML rules.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use listing_agent::automation::{EngineTimings, PageAutomation, ScreenshotStore};
use listing_agent::detection::provider::VisionProvider;
use listing_agent::detection::{DetectionError, FormDetectionService};
use listing_agent::executor::SubmissionExecutor;
use listing_agent::mapping::FieldMapper;
use listing_agent::renderer::{NavigationResult, RenderContext, Renderer};
use listing_core::{DirectoryDescriptor, ProductSnapshot};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FORM_HTML: &str = r#"<html><body>
<form id="listing">
  <label for="product_name">Product Name</label>
  <input id="product_name" name="product_name" type="text" required>
  <input id="website" name="website" type="url">
  <textarea id="description" name="description"></textarea>
  <input id="email" name="email" type="email">
  <input id="logo" name="logo" type="file">
  <input type="hidden" name="csrf" value="x">
  <button type="submit">Submit</button>
</form>
</body></html>"#;

pub const SUBMIT_BUTTON: &str = r#"button[type="submit"]"#;

/// A form whose controls are not typed into: a select, a checkbox, a radio.
pub const CHOICE_HTML: &str = r#"<html><body>
<form id="listing">
  <input id="product_name" name="product_name" type="text">
  <select id="category" name="category">
    <option value="ai">AI</option>
    <option value="devtools">Developer Tools</option>
  </select>
  <input id="free_pricing" name="free_pricing" type="checkbox">
  <input id="listing_type" name="listing_type" type="radio" value="saas">
  <button type="submit">Submit</button>
</form>
</body></html>"#;

/// Selectors present in `FORM_HTML`.
pub fn form_elements() -> Vec<String> {
    ["#listing", "#product_name", "#website", "#description", "#email", "#logo", SUBMIT_BUTTON]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Typed(String, String),
    Files(String, Vec<String>),
    Selected(String, String),
    Checked(String, bool),
    Clicked(String),
    Closed,
}

/// How the fake page behaves.
#[derive(Debug, Clone)]
pub struct PageScript {
    pub status: Option<u16>,
    pub html: String,
    /// Selectors that exist and are visible.
    pub elements: Vec<String>,
    pub result_url: String,
    pub result_html: String,
    /// Typing into this selector panics.
    pub panic_on: Option<String>,
}

impl PageScript {
    pub fn form() -> Self {
        Self {
            status: Some(200),
            html: FORM_HTML.to_string(),
            elements: form_elements(),
            result_url: "https://dir.example/submit".to_string(),
            result_html: "<h1>Thank you for your submission</h1>".to_string(),
            panic_on: None,
        }
    }

    pub fn choices() -> Self {
        Self {
            html: CHOICE_HTML.to_string(),
            elements: ["#listing", "#product_name", "#category", "#free_pricing", "#listing_type", SUBMIT_BUTTON]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Self::form()
        }
    }

    pub fn panicking_on(mut self, selector: &str) -> Self {
        self.panic_on = Some(selector.to_string());
        self
    }

    pub fn with_element(mut self, selector: &str) -> Self {
        self.elements.push(selector.to_string());
        self
    }

    pub fn without_element(mut self, selector: &str) -> Self {
        self.elements.retain(|s| s != selector);
        self
    }
}

pub struct FakePage {
    script: PageScript,
    url: Mutex<String>,
    submitted: AtomicBool,
    actions: Arc<Mutex<Vec<Action>>>,
}

impl FakePage {
    fn has(&self, selector: &str) -> bool {
        self.script.elements.iter().any(|s| s == selector)
    }

    fn push(&self, action: Action) {
        self.actions.lock().unwrap().push(action);
    }

    fn require(&self, selector: &str) -> Result<()> {
        if !self.has(selector) {
            bail!("element not found: {selector}");
        }
        Ok(())
    }
}

#[async_trait]
impl RenderContext for FakePage {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        *self.url.lock().unwrap() = url.to_string();
        Ok(NavigationResult {
            final_url: url.to_string(),
            status: self.script.status,
            load_time_ms: 1,
        })
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn get_html(&self) -> Result<String> {
        Ok(if self.submitted.load(Ordering::SeqCst) {
            self.script.result_html.clone()
        } else {
            self.script.html.clone()
        })
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn type_text(&self, selector: &str, text: &str, _delay: Duration) -> Result<()> {
        self.require(selector)?;
        if self.script.panic_on.as_deref() == Some(selector) {
            panic!("page state lost while typing into {selector}");
        }
        self.push(Action::Typed(selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn set_input_files(&self, selector: &str, files: &[String]) -> Result<()> {
        self.require(selector)?;
        self.push(Action::Files(selector.to_string(), files.to_vec()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.require(selector)?;
        self.push(Action::Clicked(selector.to_string()));
        self.submitted.store(true, Ordering::SeqCst);
        *self.url.lock().unwrap() = self.script.result_url.clone();
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.push(Action::Closed);
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.has(selector))
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        Ok(self.has(selector))
    }

    async fn clear_value(&self, selector: &str) -> Result<()> {
        self.require(selector)
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        self.require(selector)?;
        self.push(Action::Selected(selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<()> {
        self.require(selector)?;
        self.push(Action::Checked(selector.to_string(), checked));
        Ok(())
    }

    async fn scroll_into_view(&self, _selector: &str) -> Result<()> {
        Ok(())
    }

    async fn tag_button_with_text(&self, _text: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Hands out one `FakePage` per context and records what happened on each.
pub struct FakeRenderer {
    script: PageScript,
    pub actions: Arc<Mutex<Vec<Action>>>,
    opened: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(script: PageScript) -> Self {
        Self {
            script,
            actions: Arc::new(Mutex::new(Vec::new())),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            script: self.script.clone(),
            url: Mutex::new(String::new()),
            submitted: AtomicBool::new(false),
            actions: Arc::clone(&self.actions),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        0
    }
}

/// A provider whose every call fails, counting the calls.
pub struct OfflineProvider {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl VisionProvider for OfflineProvider {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn analyze(&self, _screenshot_b64: &str, _html: &str) -> Result<String, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DetectionError::Transport("offline".into()))
    }
}

pub fn product() -> ProductSnapshot {
    ProductSnapshot {
        name: "Acme Rockets".into(),
        website_url: "https://acme.io".into(),
        tagline: Some("Rockets for everyone".into()),
        short_description: Some("Reusable rockets.".into()),
        long_description: Some("Reusable rockets for small teams.".into()),
        contact_email: "hi@acme.io".into(),
        logo_path: Some("/tmp/acme-logo.png".into()),
        ..Default::default()
    }
}

pub fn directory() -> DirectoryDescriptor {
    DirectoryDescriptor {
        name: "Tool Directory".into(),
        url: "https://dir.example/submit".into(),
        ..Default::default()
    }
}

/// An executor over `renderer` whose detection always falls back to rules.
pub fn executor(renderer: Arc<FakeRenderer>, root: &Path) -> (SubmissionExecutor, Arc<AtomicUsize>) {
    executor_with(renderer, root, EngineTimings::instant())
}

pub fn executor_with(
    renderer: Arc<FakeRenderer>,
    root: &Path,
    timings: EngineTimings,
) -> (SubmissionExecutor, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let detection = FormDetectionService::new(Box::new(OfflineProvider {
        calls: Arc::clone(&calls),
    }));
    let engine = PageAutomation::new(
        Arc::new(detection),
        FieldMapper::new(),
        ScreenshotStore::new(root),
        timings,
    );
    (SubmissionExecutor::new(renderer, engine), calls)
}
