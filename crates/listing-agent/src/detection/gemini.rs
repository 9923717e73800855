//! Google Gemini `generateContent` provider.

use super::provider::{
    http_client, send_json, text_at, user_prompt, VisionProvider, MAX_OUTPUT_TOKENS,
    SYSTEM_PROMPT, TEMPERATURE,
};
use super::DetectionError;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: Option<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: BASE_URL.to_string(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn analyze(&self, screenshot_b64: &str, html: &str) -> Result<String, DetectionError> {
        let body = json!({
            "contents": [{
                "parts": [
                    {"text": format!("{SYSTEM_PROMPT}\n\n{}", user_prompt(html))},
                    {"inline_data": {"mime_type": "image/png", "data": screenshot_b64}}
                ]
            }],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS
            }
        });
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let request = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body);
        let response = send_json(self.name(), request).await?;
        text_at(&response, "/candidates/0/content/parts/0/text")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_gemini_model_path_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "gk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "{\"form_found\": true}"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = GeminiProvider::new("gk".into(), None, Duration::from_secs(5))
            .with_base_url(server.uri());
        assert_eq!(p.analyze("AAAA", "<form>").await.unwrap(), "{\"form_found\": true}");
    }
}
