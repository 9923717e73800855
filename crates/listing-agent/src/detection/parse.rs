//! Parsing of raw provider text into a `FormDetectionResult`.

use super::DetectionError;
use listing_core::{FieldType, FormDetectionResult, FormField};
use serde::Deserialize;

/// Strip the first fenced code block, if any, and return the JSON body.
///
/// A `json` fence (any case) is preferred over other fences.
/// Unfenced text is returned trimmed.
pub fn extract_json_block(raw: &str) -> &str {
    let mut blocks = fenced_blocks(raw).peekable();
    let first = blocks.peek().map(|(_, body)| *body);
    blocks
        .find(|(tag, _)| tag.eq_ignore_ascii_case("json"))
        .map(|(_, body)| body)
        .or(first)
        .unwrap_or_else(|| raw.trim())
}

/// `(language tag, body)` for every fenced block. An unterminated fence
/// runs to the end of the text.
fn fenced_blocks(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split("```").skip(1).step_by(2).map(|block| {
        let tag_len = block
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(block.len());
        (&block[..tag_len], block[tag_len..].trim())
    })
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(default)]
    form_found: bool,
    #[serde(default)]
    form_selector: Option<String>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    submit_button_selector: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "type")]
    field_type: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    placeholder: Option<String>,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    options: Option<Vec<serde_json::Value>>,
}

/// Parse a provider response for `url`.
///
/// Fields without a selector cannot be targeted and are dropped.
/// Confidence is clamped into `[0.0, 1.0]`.
pub fn parse_detection(raw: &str, url: &str) -> Result<FormDetectionResult, DetectionError> {
    let body = extract_json_block(raw);
    if body.is_empty() {
        return Err(DetectionError::EmptyResponse);
    }
    let parsed: RawDetection =
        serde_json::from_str(body).map_err(|e| DetectionError::Parse(e.to_string()))?;

    let fields = parsed
        .fields
        .into_iter()
        .filter_map(|f| {
            let selector = non_blank(f.selector)?;
            Some(FormField {
                name: non_blank(f.name).unwrap_or_else(|| selector.clone()),
                field_type: f
                    .field_type
                    .as_deref()
                    .map(FieldType::parse_lenient)
                    .unwrap_or(FieldType::Text),
                label: non_blank(f.label),
                placeholder: non_blank(f.placeholder),
                required: f.required.unwrap_or(false),
                selector,
                options: f.options.map(|opts| {
                    opts.into_iter()
                        .filter_map(|v| match v {
                            serde_json::Value::String(s) => Some(s),
                            serde_json::Value::Null => None,
                            other => Some(other.to_string()),
                        })
                        .collect()
                }),
            })
        })
        .collect();

    let confidence = parsed
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0) as f32;

    Ok(FormDetectionResult {
        url: url.to_string(),
        form_found: parsed.form_found,
        form_selector: non_blank(parsed.form_selector),
        fields,
        submit_button_selector: non_blank(parsed.submit_button_selector),
        confidence,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
