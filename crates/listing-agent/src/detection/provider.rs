//! Vision provider capability, credentials and static selection.

use super::DetectionError;
use crate::config::read_env_string;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// HTML prefix budget sent to most providers, in characters.
pub const DEFAULT_HTML_BUDGET: usize = 15_000;
/// Provider HTTP timeout.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);
pub(crate) const MAX_OUTPUT_TOKENS: u32 = 4096;
pub(crate) const TEMPERATURE: f64 = 0.1;

pub(crate) const SYSTEM_PROMPT: &str = r#"You analyze web pages of product directories and locate the form used to list a new product, tool or website.

Using the screenshot and the HTML, identify:
1. The main listing form (not login, search or newsletter forms)
2. Every fillable field with its type, label and a CSS selector that targets it
3. The submit button

Reply with one JSON object of exactly this shape:
{
    "form_found": boolean,
    "form_selector": "CSS selector of the form element or null",
    "fields": [
        {
            "name": "field name or id",
            "field_type": "text|email|url|textarea|select|file|checkbox|radio",
            "label": "visible label text or null",
            "placeholder": "placeholder text or null",
            "required": boolean,
            "selector": "CSS selector of the field",
            "options": ["choice", "..."]
        }
    ],
    "submit_button_selector": "CSS selector of the submit button or null",
    "confidence": number between 0.0 and 1.0
}"#;

/// User turn: the HTML prefix plus what to look for.
pub(crate) fn user_prompt(html: &str) -> String {
    format!(
        "Find the product submission form on this page.\n\n\
         Look for inputs such as product name, website URL, description, contact email, \
         category and logo upload, and for a Submit, Add or Create button.\n\n\
         HTML:\n```html\n{html}\n```\n\n\
         Answer with the JSON object only."
    )
}

/// A vision-capable model that describes the form on a page.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// How many characters of HTML this provider accepts.
    fn max_html_chars(&self) -> usize {
        DEFAULT_HTML_BUDGET
    }

    /// Send the screenshot and truncated HTML; return the model's raw text.
    async fn analyze(&self, screenshot_b64: &str, html: &str) -> Result<String, DetectionError>;
}

/// Supported vision vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Groq,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "anthropic" | "claude" => Some(ProviderKind::Anthropic),
            "gemini" | "google" => Some(ProviderKind::Gemini),
            "groq" => Some(ProviderKind::Groq),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Groq => "groq",
        }
    }
}

/// Fallback order after the preferred provider.
const FALLBACK_ORDER: [ProviderKind; 4] = [
    ProviderKind::OpenAi,
    ProviderKind::Gemini,
    ProviderKind::Groq,
    ProviderKind::Anthropic,
];

/// Provider credentials and preferences.
#[derive(Clone, Default)]
pub struct ProviderSettings {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub preferred: Option<ProviderKind>,
    /// Model override from `LLM_MODEL`.
    pub model: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("anthropic_api_key", &self.anthropic_api_key.as_ref().map(|_| "***"))
            .field("google_api_key", &self.google_api_key.as_ref().map(|_| "***"))
            .field("groq_api_key", &self.groq_api_key.as_ref().map(|_| "***"))
            .field("preferred", &self.preferred)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderSettings {
    pub fn from_env() -> Self {
        let key = |name: &str| read_env_string(name).filter(|v| !v.is_empty());
        Self {
            openai_api_key: key("OPENAI_API_KEY"),
            anthropic_api_key: key("ANTHROPIC_API_KEY"),
            google_api_key: key("GOOGLE_API_KEY"),
            groq_api_key: key("GROQ_API_KEY"),
            preferred: ProviderKind::parse(
                &read_env_string("LLM_PROVIDER").unwrap_or_else(|| "gemini".to_string()),
            ),
            model: key("LLM_MODEL"),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn key_for(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::OpenAi => self.openai_api_key.as_deref(),
            ProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
            ProviderKind::Gemini => self.google_api_key.as_deref(),
            ProviderKind::Groq => self.groq_api_key.as_deref(),
        }
    }

    /// The provider to use: the preferred one if it has a key, then the
    /// first keyed provider in fallback order, then OpenAI without a key.
    pub fn select(&self) -> ProviderKind {
        if let Some(p) = self.preferred {
            if self.key_for(p).is_some() {
                return p;
            }
        }
        FALLBACK_ORDER
            .into_iter()
            .find(|k| self.key_for(*k).is_some())
            .unwrap_or(ProviderKind::OpenAi)
    }

    /// The model override applies only to the provider family it names.
    pub fn model_for(&self, kind: ProviderKind) -> Option<&str> {
        let model = self.model.as_deref()?;
        let lower = model.to_ascii_lowercase();
        let fits = match kind {
            ProviderKind::Gemini => lower.starts_with("gemini"),
            ProviderKind::Anthropic => lower.starts_with("claude"),
            ProviderKind::OpenAi => {
                !lower.starts_with("gemini")
                    && !lower.starts_with("claude")
                    && !lower.starts_with("llama")
            }
            ProviderKind::Groq => lower.starts_with("llama"),
        };
        fits.then_some(model)
    }
}

/// Construct the selected provider.
pub fn build_provider(settings: &ProviderSettings) -> Box<dyn VisionProvider> {
    let kind = settings.select();
    let key = settings.key_for(kind).unwrap_or_default().to_string();
    let model = settings.model_for(kind).map(String::from);
    let timeout = if settings.timeout.is_zero() {
        DEFAULT_PROVIDER_TIMEOUT
    } else {
        settings.timeout
    };
    debug!(provider = kind.as_str(), model = ?model, "selected vision provider");

    match kind {
        ProviderKind::OpenAi => Box::new(super::openai::OpenAiProvider::openai(key, model, timeout)),
        ProviderKind::Groq => Box::new(super::openai::OpenAiProvider::groq(key, model, timeout)),
        ProviderKind::Anthropic => {
            Box::new(super::anthropic::AnthropicProvider::new(key, model, timeout))
        }
        ProviderKind::Gemini => Box::new(super::gemini::GeminiProvider::new(key, model, timeout)),
    }
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Send a prepared request and return the JSON body of a 200 response.
pub(crate) async fn send_json(
    provider: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, DetectionError> {
    let response = request
        .send()
        .await
        .map_err(|e| DetectionError::Transport(e.to_string()))?;
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        debug!(provider, status = status.as_u16(), body = %truncate(&body, 500), "provider error body");
        return Err(DetectionError::Status(status.as_u16()));
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| DetectionError::Parse(e.to_string()))
}

/// Pull the text at `pointer` out of a provider response.
pub(crate) fn text_at(body: &serde_json::Value, pointer: &str) -> Result<String, DetectionError> {
    body.pointer(pointer)
        .and_then(|v| v.as_str())
        .map(String::from)
        .filter(|s| !s.trim().is_empty())
        .ok_or(DetectionError::EmptyResponse)
}

/// Longest prefix of `s` with at most `max_chars` characters.
pub fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ProviderSettings {
        ProviderSettings {
            timeout: DEFAULT_PROVIDER_TIMEOUT,
            ..Default::default()
        }
    }

    #[test]
    fn test_preferred_provider_needs_a_key() {
        let mut s = settings();
        s.preferred = Some(ProviderKind::Gemini);
        s.groq_api_key = Some("g".into());
        assert_eq!(s.select(), ProviderKind::Groq);

        s.google_api_key = Some("k".into());
        assert_eq!(s.select(), ProviderKind::Gemini);
    }

    #[test]
    fn test_fallback_order() {
        let mut s = settings();
        assert_eq!(s.select(), ProviderKind::OpenAi);
        s.anthropic_api_key = Some("a".into());
        assert_eq!(s.select(), ProviderKind::Anthropic);
        s.groq_api_key = Some("g".into());
        assert_eq!(s.select(), ProviderKind::Groq);
        s.google_api_key = Some("k".into());
        assert_eq!(s.select(), ProviderKind::Gemini);
        s.openai_api_key = Some("o".into());
        assert_eq!(s.select(), ProviderKind::OpenAi);
    }

    #[test]
    fn test_model_override_scoped_to_family() {
        let mut s = settings();
        s.model = Some("gemini-1.5-pro".into());
        assert_eq!(s.model_for(ProviderKind::Gemini), Some("gemini-1.5-pro"));
        assert_eq!(s.model_for(ProviderKind::OpenAi), None);
        s.model = Some("gpt-4o-mini".into());
        assert_eq!(s.model_for(ProviderKind::OpenAi), Some("gpt-4o-mini"));
        assert_eq!(s.model_for(ProviderKind::Gemini), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("", 3), "");
    }

    #[test]
    fn test_debug_hides_keys() {
        let mut s = settings();
        s.openai_api_key = Some("sk-secret".into());
        assert!(!format!("{s:?}").contains("sk-secret"));
    }
}
