//! Product snapshot and the attributes a form field can be filled from.

use serde::{Deserialize, Serialize};

/// The product being listed, as captured when the job was created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub website_url: String,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub contact_email: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub twitter_url: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub pricing_model: Option<String>,
    #[serde(default)]
    pub pricing_details: Option<String>,
    /// Local path to the logo file, uploaded into `file` fields.
    #[serde(default)]
    pub logo_path: Option<String>,
}

/// A product attribute a detected field can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductAttribute {
    Name,
    WebsiteUrl,
    Tagline,
    ShortDescription,
    LongDescription,
    Category,
    Tags,
    ContactEmail,
    ContactName,
    TwitterUrl,
    LinkedinUrl,
    GithubUrl,
    PricingModel,
    PricingDetails,
}

impl ProductSnapshot {
    /// Resolve an attribute to its fill value.
    ///
    /// Descriptions fall back to their shorter siblings: the short
    /// description to the tagline, the long description to the short one.
    /// Empty strings resolve to `None`.
    pub fn attribute(&self, attr: ProductAttribute) -> Option<String> {
        let value = match attr {
            ProductAttribute::Name => Some(self.name.clone()),
            ProductAttribute::WebsiteUrl => Some(self.website_url.clone()),
            ProductAttribute::Tagline => self.tagline.clone(),
            ProductAttribute::ShortDescription => {
                non_empty(&self.short_description).or_else(|| non_empty(&self.tagline))
            }
            ProductAttribute::LongDescription => non_empty(&self.long_description)
                .or_else(|| non_empty(&self.short_description)),
            ProductAttribute::Category => self.category.clone(),
            ProductAttribute::Tags => Some(self.tags.join(", ")),
            ProductAttribute::ContactEmail => Some(self.contact_email.clone()),
            ProductAttribute::ContactName => self.contact_name.clone(),
            ProductAttribute::TwitterUrl => self.twitter_url.clone(),
            ProductAttribute::LinkedinUrl => self.linkedin_url.clone(),
            ProductAttribute::GithubUrl => self.github_url.clone(),
            ProductAttribute::PricingModel => self.pricing_model.clone(),
            ProductAttribute::PricingDetails => self.pricing_details.clone(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}
