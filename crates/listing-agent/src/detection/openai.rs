//! OpenAI chat-completions provider. Groq serves the same wire format.

use super::provider::{
    http_client, send_json, text_at, user_prompt, VisionProvider, DEFAULT_HTML_BUDGET,
    MAX_OUTPUT_TOKENS, SYSTEM_PROMPT, TEMPERATURE,
};
use super::DetectionError;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4o";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const GROQ_MODEL: &str = "llama-3.2-90b-vision-preview";
const GROQ_HTML_BUDGET: usize = 10_000;

/// Provider speaking the `/chat/completions` protocol.
pub struct OpenAiProvider {
    name: &'static str,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    html_budget: usize,
    /// The system prompt travels as its own message, or is merged into the
    /// user turn for backends that reject system messages next to images.
    separate_system: bool,
}

impl OpenAiProvider {
    pub fn openai(api_key: String, model: Option<String>, timeout: Duration) -> Self {
        Self {
            name: "openai",
            client: http_client(timeout),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key,
            model: model.unwrap_or_else(|| OPENAI_MODEL.to_string()),
            html_budget: DEFAULT_HTML_BUDGET,
            separate_system: true,
        }
    }

    pub fn groq(api_key: String, model: Option<String>, timeout: Duration) -> Self {
        Self {
            name: "groq",
            client: http_client(timeout),
            base_url: GROQ_BASE_URL.to_string(),
            api_key,
            model: model.unwrap_or_else(|| GROQ_MODEL.to_string()),
            html_budget: GROQ_HTML_BUDGET,
            separate_system: false,
        }
    }

    /// Point at a different API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(&self, screenshot_b64: &str, html: &str) -> serde_json::Value {
        let image = json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:image/png;base64,{screenshot_b64}"),
                "detail": "high"
            }
        });
        let messages = if self.separate_system {
            json!([
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": [image, {"type": "text", "text": user_prompt(html)}]}
            ])
        } else {
            let text = format!("{SYSTEM_PROMPT}\n\n{}", user_prompt(html));
            json!([{"role": "user", "content": [{"type": "text", "text": text}, image]}])
        };
        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE
        })
    }
}

#[async_trait]
impl VisionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn max_html_chars(&self) -> usize {
        self.html_budget
    }

    async fn analyze(&self, screenshot_b64: &str, html: &str) -> Result<String, DetectionError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(screenshot_b64, html));
        let body = send_json(self.name, request).await?;
        text_at(&body, "/choices/0/message/content")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_openai_request_and_response_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o", "max_tokens": 4096})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"form_found\": false}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::openai("sk-test".into(), None, Duration::from_secs(5))
            .with_base_url(server.uri());
        let text = provider.analyze("aGVsbG8=", "<form></form>").await.unwrap();
        assert_eq!(text, "{\"form_found\": false}");
    }

    #[tokio::test]
    async fn test_non_200_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::groq("gsk".into(), None, Duration::from_secs(5))
            .with_base_url(server.uri());
        assert_eq!(provider.max_html_chars(), GROQ_HTML_BUDGET);
        let err = provider.analyze("", "").await.unwrap_err();
        assert!(matches!(err, DetectionError::Status(429)));
    }

    #[test]
    fn test_groq_merges_system_prompt() {
        let p = OpenAiProvider::groq("k".into(), None, Duration::from_secs(1));
        let body = p.request_body("AAAA", "<html>");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(body["model"], GROQ_MODEL);
    }
}
