//! Form detection: a vision provider first, HTML rules as the fallback.
//!
//! `FormDetectionService::detect` never fails. Transport errors, non-200
//! responses and unparsable model output all degrade to a zero-confidence
//! "not found" result before the rule-based fallback is tried.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod parse;
pub mod provider;
pub mod rules;

use listing_core::FormDetectionResult;
use provider::{truncate, ProviderSettings, VisionProvider};
use rules::{RuleBasedDetector, RULE_CONFIDENCE};
use tracing::{debug, info, warn};

/// Why a provider call produced no usable detection.
#[derive(thiserror::Error, Debug)]
pub enum DetectionError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("unparsable provider response: {0}")]
    Parse(String),

    #[error("provider returned no text")]
    EmptyResponse,
}

/// Orchestrates provider analysis and the rule-based fallback.
pub struct FormDetectionService {
    provider: Box<dyn VisionProvider>,
    rules: RuleBasedDetector,
}

impl FormDetectionService {
    pub fn new(provider: Box<dyn VisionProvider>) -> Self {
        Self {
            provider,
            rules: RuleBasedDetector::new(),
        }
    }

    /// Select a provider once, from configured credentials.
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self::new(provider::build_provider(settings))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn detect(&self, screenshot_b64: &str, html: &str, url: &str) -> FormDetectionResult {
        let primary = self.detect_with_provider(screenshot_b64, html, url).await;
        if primary.is_usable() {
            return primary;
        }

        let fallback = self.rules.detect(html, url);
        if !fallback.form_found {
            debug!(url, "rule-based fallback found no fields");
            return primary;
        }
        info!(url, fields = fallback.fields.len(), "using rule-based form detection");
        FormDetectionResult {
            form_selector: primary.form_selector.or(fallback.form_selector),
            submit_button_selector: primary.submit_button_selector,
            confidence: RULE_CONFIDENCE,
            ..fallback
        }
    }

    async fn detect_with_provider(
        &self,
        screenshot_b64: &str,
        html: &str,
        url: &str,
    ) -> FormDetectionResult {
        let html = truncate(html, self.provider.max_html_chars());
        debug!(
            provider = self.provider.name(),
            html_chars = html.len(),
            screenshot_bytes = screenshot_b64.len(),
            "requesting form analysis"
        );

        let raw = match self.provider.analyze(screenshot_b64, html).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "form analysis failed");
                return FormDetectionResult::not_found(url);
            }
        };

        match parse::parse_detection(&raw, url) {
            Ok(result) => result,
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "could not parse form analysis");
                FormDetectionResult::not_found(url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Scripted {
        reply: Result<String, u16>,
        seen_html_len: Arc<Mutex<Option<usize>>>,
    }

    impl Scripted {
        fn ok(s: &str) -> Self {
            Self {
                reply: Ok(s.to_string()),
                seen_html_len: Arc::default(),
            }
        }
        fn status(code: u16) -> Self {
            Self {
                reply: Err(code),
                seen_html_len: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl VisionProvider for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn max_html_chars(&self) -> usize {
            32
        }
        async fn analyze(&self, _s: &str, html: &str) -> Result<String, DetectionError> {
            *self.seen_html_len.lock().unwrap() = Some(html.chars().count());
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(code) => Err(DetectionError::Status(*code)),
            }
        }
    }

    const FORM: &str = r#"<form><input id="name" name="name"><input name="url" type="url"></form>"#;

    #[tokio::test]
    async fn test_provider_result_used_when_usable() {
        let svc = FormDetectionService::new(Box::new(Scripted::ok(
            r##"{"form_found": true, "fields": [{"name": "n", "selector": "#n"}], "confidence": 0.8}"##,
        )));
        let r = svc.detect("", FORM, "https://d.example").await;
        assert!((r.confidence - 0.8).abs() < 1e-6);
        assert_eq!(r.fields.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_degrades_to_not_found() {
        let svc = FormDetectionService::new(Box::new(Scripted::ok("this is not json")));
        let r = svc.detect("", "<p>no form here</p>", "https://d.example").await;
        assert!(!r.form_found);
        assert_eq!(r.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_provider_error_falls_back_to_rules() {
        let svc = FormDetectionService::new(Box::new(Scripted::status(500)));
        let r = svc.detect("", FORM, "https://d.example").await;
        assert!(r.form_found);
        assert_eq!(r.confidence, RULE_CONFIDENCE);
        assert_eq!(r.fields.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_provider_form_falls_back_and_keeps_submit() {
        let svc = FormDetectionService::new(Box::new(Scripted::ok(
            r##"{"form_found": true, "fields": [], "submit_button_selector": "#go", "confidence": 0.9}"##,
        )));
        let r = svc.detect("", FORM, "https://d.example").await;
        assert_eq!(r.confidence, RULE_CONFIDENCE);
        assert_eq!(r.submit_button_selector.as_deref(), Some("#go"));
    }

    #[tokio::test]
    async fn test_html_truncated_to_provider_budget() {
        let provider = Scripted::ok("{}");
        let seen = Arc::clone(&provider.seen_html_len);
        let svc = FormDetectionService::new(Box::new(provider));
        svc.detect("", &"x".repeat(100), "u").await;
        assert_eq!(*seen.lock().unwrap(), Some(32));
    }
}
