//! Rule-based form detection from raw HTML.
//!
//! No network calls. Used when the vision provider finds nothing.

use listing_core::{FieldType, FormDetectionResult, FormField};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

/// Confidence reported for forms found by HTML rules alone.
pub const RULE_CONFIDENCE: f32 = 0.5;

/// Deterministic detector over `input`, `textarea` and `select` elements.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedDetector;

impl RuleBasedDetector {
    pub fn new() -> Self {
        Self
    }

    /// Enumerate targetable form controls in document order.
    ///
    /// Controls with neither an `id` nor a `name` are skipped, as are
    /// inputs that carry no user data (hidden, submit, button, reset, image).
    pub fn extract_fields(&self, html: &str) -> Vec<FormField> {
        let document = Html::parse_document(html);
        let field_sel =
            Selector::parse("input, textarea, select").expect("field selector is valid");
        let label_sel = Selector::parse("label[for]").expect("label selector is valid");
        let option_sel = Selector::parse("option").expect("option selector is valid");

        let labels: HashMap<&str, String> = document
            .select(&label_sel)
            .filter_map(|l| {
                let target = l.value().attr("for")?;
                let text = element_text(&l);
                (!text.is_empty()).then_some((target, text))
            })
            .collect();

        let mut fields = Vec::new();
        for el in document.select(&field_sel) {
            let tag = el.value().name();
            let field_type = match tag {
                "textarea" => FieldType::Textarea,
                "select" => FieldType::Select,
                _ => match FieldType::from_input_type(el.value().attr("type").unwrap_or("text")) {
                    Some(t) => t,
                    None => continue,
                },
            };

            let id = attr_non_empty(&el, "id");
            let name_attr = attr_non_empty(&el, "name");
            let selector = match (id, name_attr) {
                (Some(id), _) => id_selector(id),
                (None, Some(name)) => format!("[name='{}']", escape_attr(name)),
                (None, None) => continue,
            };

            let options = (field_type == FieldType::Select).then(|| {
                el.select(&option_sel)
                    .filter_map(|o| {
                        o.value()
                            .attr("value")
                            .map(|v| v.trim().to_string())
                            .or_else(|| Some(element_text(&o)))
                    })
                    .filter(|v| !v.is_empty())
                    .collect::<Vec<_>>()
            });

            fields.push(FormField {
                name: name_attr.or(id).unwrap_or_default().to_string(),
                field_type,
                label: id.and_then(|id| labels.get(id).cloned()),
                placeholder: attr_non_empty(&el, "placeholder").map(String::from),
                required: el.value().attr("required").is_some(),
                selector,
                options,
            });
        }
        fields
    }

    /// Full detection result for `html`, usable directly as a fallback.
    pub fn detect(&self, html: &str, url: &str) -> FormDetectionResult {
        let fields = self.extract_fields(html);
        if fields.is_empty() {
            return FormDetectionResult::not_found(url);
        }
        FormDetectionResult {
            url: url.to_string(),
            form_found: true,
            form_selector: first_form_selector(html),
            fields,
            submit_button_selector: None,
            confidence: RULE_CONFIDENCE,
        }
    }
}

fn first_form_selector(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let form_sel = Selector::parse("form").expect("form selector is valid");
    let form = document.select(&form_sel).next()?;
    Some(match attr_non_empty(&form, "id") {
        Some(id) => id_selector(id),
        None => "form".to_string(),
    })
}

fn attr_non_empty<'a>(el: &ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value().attr(name).map(str::trim).filter(|v| !v.is_empty())
}

/// `#id` when the id is a plain CSS identifier, otherwise an attribute match.
fn id_selector(id: &str) -> String {
    let plain = id
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        format!("#{id}")
    } else {
        format!("[id='{}']", escape_attr(id))
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
