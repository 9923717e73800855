//! Post-submit outcome classification.

/// Phrases that confirm the listing was accepted. Checked first.
pub const SUCCESS_PHRASES: &[&str] = &[
    "thank you",
    "thanks for",
    "successfully submitted",
    "submission received",
    "we will review",
    "pending approval",
    "listing added",
    "product added",
    "successfully added",
];

/// Phrases that indicate the submission was rejected.
pub const ERROR_PHRASES: &[&str] = &[
    "error",
    "failed",
    "invalid",
    "required field",
    "please fill",
    "already exists",
    "duplicate",
];

/// Note attached to runs that finished without an explicit signal.
pub const UNCONFIRMED_NOTE: &str = "Could not confirm, assuming success";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed(&'static str),
    Rejected(&'static str),
    Unconfirmed,
}

/// Judge the page reached after submitting.
///
/// URL separators are read as spaces so `/thank-you` matches `thank you`.
pub fn classify(url: &str, html: &str) -> Outcome {
    let html = html.to_lowercase();
    let url = url.to_lowercase().replace(['-', '_', '+'], " ");
    let seen = |phrase: &str| html.contains(phrase) || url.contains(phrase);

    if let Some(phrase) = SUCCESS_PHRASES.iter().copied().find(|p| seen(p)) {
        return Outcome::Confirmed(phrase);
    }
    if let Some(phrase) = ERROR_PHRASES.iter().copied().find(|p| seen(p)) {
        return Outcome::Rejected(phrase);
    }
    Outcome::Unconfirmed
}
