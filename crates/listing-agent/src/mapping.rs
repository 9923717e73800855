//! Heuristic mapping of product attributes onto detected form fields.
//!
//! Field names and labels are normalized and tested against an ordered
//! synonym table. The first key contained in the name or label whose
//! candidate attributes yield a value wins. More specific keys sit above
//! the generic ones they contain (`twitter_url` before `url`,
//! `long_description` before `description`).

use listing_core::{FieldType, FormField, MappedField, ProductAttribute, ProductSnapshot};
use std::collections::HashSet;

use ProductAttribute::*;

type SynonymTable = &'static [(&'static str, &'static [ProductAttribute])];

const SYNONYMS: SynonymTable = &[
    // Social profiles, ahead of the generic url/link keys.
    ("twitter", &[TwitterUrl]),
    ("x_handle", &[TwitterUrl]),
    ("linkedin", &[LinkedinUrl]),
    ("github", &[GithubUrl]),
    // People, ahead of the product `name`.
    ("contact_name", &[ContactName]),
    ("your_name", &[ContactName]),
    ("full_name", &[ContactName]),
    ("founder", &[ContactName]),
    // Product name
    ("product_name", &[Name]),
    ("tool_name", &[Name]),
    ("startup_name", &[Name]),
    ("app_name", &[Name]),
    ("title", &[Name, Tagline]),
    ("name", &[Name]),
    // Website
    ("website_url", &[WebsiteUrl]),
    ("website", &[WebsiteUrl]),
    ("homepage", &[WebsiteUrl]),
    ("url", &[WebsiteUrl]),
    ("link", &[WebsiteUrl]),
    // Descriptions
    ("short_description", &[ShortDescription, Tagline]),
    ("long_description", &[LongDescription, ShortDescription]),
    ("tagline", &[Tagline, ShortDescription]),
    ("pitch", &[Tagline, ShortDescription]),
    ("summary", &[ShortDescription]),
    ("about", &[LongDescription, ShortDescription]),
    ("description", &[ShortDescription, LongDescription, Tagline]),
    // Contact
    ("contact_email", &[ContactEmail]),
    ("email", &[ContactEmail]),
    ("contact", &[ContactEmail]),
    // Classification
    ("categories", &[Category]),
    ("category", &[Category]),
    ("type", &[Category]),
    ("tags", &[Tags]),
    ("keywords", &[Tags]),
    // Pricing
    ("pricing_model", &[PricingModel]),
    ("pricing", &[PricingModel, PricingDetails]),
    ("price", &[PricingModel]),
];

/// Lowercase and collapse runs of separators into a single `_`.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else if matches!(ch, '_' | '-' | ' ' | '.' | '[' | ']' | ':') {
            pending_sep = true;
        }
    }
    out
}

/// Stateless field mapper over a fixed synonym table.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapper {
    table: SynonymTable,
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self { table: SYNONYMS }
    }
}

impl FieldMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map detected fields to values, in detection order.
    ///
    /// Unmatched fields are omitted. File inputs are never mapped
    /// heuristically; see [`FieldMapper::plan`] for the logo.
    pub fn map(&self, fields: &[FormField], product: &ProductSnapshot) -> Vec<(String, MappedField)> {
        self.plan(fields, product, None)
    }

    /// The ordered fill plan for a form: heuristic values plus `logo` on the
    /// first file input. A selector detected twice is filled once.
    pub fn plan(
        &self,
        fields: &[FormField],
        product: &ProductSnapshot,
        logo: Option<&str>,
    ) -> Vec<(String, MappedField)> {
        let logo = logo.map(str::trim).filter(|p| !p.is_empty());
        let logo_slot = fields.iter().position(|f| f.field_type == FieldType::File);
        let mut seen = HashSet::new();

        fields
            .iter()
            .enumerate()
            .filter_map(|(i, field)| {
                let value = if field.field_type == FieldType::File {
                    logo.filter(|_| logo_slot == Some(i))?.to_string()
                } else {
                    self.value_for(field, product)?
                };
                if !seen.insert(field.selector.as_str()) {
                    return None;
                }
                Some((
                    field.selector.clone(),
                    MappedField {
                        field_name: field.name.clone(),
                        field_type: field.field_type,
                        value,
                    },
                ))
            })
            .collect()
    }

    /// The value the first matching synonym group resolves to, if any.
    pub fn value_for(&self, field: &FormField, product: &ProductSnapshot) -> Option<String> {
        let name = normalize(&field.name);
        let label = field.label.as_deref().map(normalize).unwrap_or_default();

        self.table
            .iter()
            .filter(|(key, _)| name.contains(key) || (!label.is_empty() && label.contains(key)))
            .find_map(|(_, attrs)| attrs.iter().find_map(|a| product.attribute(*a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, label: Option<&str>, ty: FieldType) -> FormField {
        FormField {
            name: name.into(),
            field_type: ty,
            label: label.map(String::from),
            placeholder: None,
            required: false,
            selector: format!("[name='{name}']"),
            options: None,
        }
    }

    fn value<'a>(mapped: &'a [(String, MappedField)], selector: &str) -> Option<&'a str> {
        mapped
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, m)| m.value.as_str())
    }

    fn product() -> ProductSnapshot {
        ProductSnapshot {
            name: "Acme Rockets".into(),
            website_url: "https://x.io".into(),
            tagline: Some("Rockets, delivered".into()),
            short_description: Some("Same-day rocket delivery.".into()),
            long_description: Some("A much longer story about rockets.".into()),
            contact_email: "hi@x.io".into(),
            twitter_url: Some("https://twitter.com/acme".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Product-Name"), "product_name");
        assert_eq!(normalize("  Website  URL "), "website_url");
        assert_eq!(normalize("listing[short--description]"), "listing_short_description");
    }

    #[test]
    fn test_website_url_field() {
        let fields = vec![field("website_url", None, FieldType::Url)];
        let mapped = FieldMapper::new().map(&fields, &product());
        assert_eq!(value(&mapped, "[name='website_url']"), Some("https://x.io"));
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let fields = vec![
            field("name", None, FieldType::Text),
            field("desc", Some("Short description"), FieldType::Textarea),
            field("email", None, FieldType::Email),
            field("extra", None, FieldType::Text),
        ];
        let mapper = FieldMapper::new();
        assert_eq!(mapper.map(&fields, &product()), mapper.map(&fields, &product()));
    }

    #[test]
    fn test_unmapped_fields_are_omitted() {
        let fields = vec![
            field("favourite_colour", None, FieldType::Text),
            field("name", None, FieldType::Text),
        ];
        let mapped = FieldMapper::new().map(&fields, &product());
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].0, "[name='name']");
    }

    #[test]
    fn test_label_matches_when_name_is_opaque() {
        let fields = vec![field("field_17", Some("Your email"), FieldType::Email)];
        let mapped = FieldMapper::new().map(&fields, &product());
        assert_eq!(value(&mapped, "[name='field_17']"), Some("hi@x.io"));
    }

    #[test]
    fn test_specific_keys_beat_generic_ones() {
        let m = FieldMapper::new();
        let p = product();
        assert_eq!(
            m.value_for(&field("twitter_url", None, FieldType::Url), &p).as_deref(),
            Some("https://twitter.com/acme")
        );
        assert_eq!(
            m.value_for(&field("long_description", None, FieldType::Textarea), &p).as_deref(),
            Some("A much longer story about rockets.")
        );
        assert_eq!(
            m.value_for(&field("description", None, FieldType::Textarea), &p).as_deref(),
            Some("Same-day rocket delivery.")
        );
    }

    #[test]
    fn test_group_without_value_falls_through() {
        // No LinkedIn profile: the field falls through to the `url` group.
        let f = field("linkedin_url", None, FieldType::Url);
        assert_eq!(
            FieldMapper::new().value_for(&f, &product()).as_deref(),
            Some("https://x.io")
        );
    }

    #[test]
    fn test_file_fields_left_to_engine() {
        let fields = vec![field("logo_url", None, FieldType::File)];
        assert!(FieldMapper::new().map(&fields, &product()).is_empty());
    }

    #[test]
    fn test_plan_keeps_detection_order() {
        let fields = vec![
            field("website", None, FieldType::Url),
            field("screenshot", None, FieldType::File),
            field("name", None, FieldType::Text),
            field("logo", None, FieldType::File),
            field("email", None, FieldType::Email),
        ];
        let plan = FieldMapper::new().plan(&fields, &product(), Some("/tmp/logo.png"));
        let order: Vec<_> = plan.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(
            order,
            ["[name='website']", "[name='screenshot']", "[name='name']", "[name='email']"]
        );
        assert_eq!(plan[1].1.value, "/tmp/logo.png");
    }

    #[test]
    fn test_plan_without_logo_skips_file_inputs() {
        let fields = vec![
            field("logo", None, FieldType::File),
            field("name", None, FieldType::Text),
            field("name", None, FieldType::Text),
        ];
        let plan = FieldMapper::new().plan(&fields, &product(), Some("  "));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].1.value, "Acme Rockets");
    }
}
