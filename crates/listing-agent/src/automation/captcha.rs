//! CAPTCHA marker detection.

use crate::renderer::RenderContext;

/// Selectors whose presence means a human has to finish the submission.
pub const CAPTCHA_MARKERS: &[&str] = &[
    r#"iframe[src*="recaptcha"]"#,
    r#"iframe[src*="hcaptcha"]"#,
    r#"iframe[src*="turnstile"]"#,
    r#"iframe[src*="captcha"]"#,
    ".g-recaptcha",
    ".h-captcha",
    ".cf-turnstile",
    "#captcha",
    "[data-captcha]",
    "[data-sitekey]",
];

/// The first marker present on the page. Lookup errors count as absent.
pub async fn find_marker(ctx: &dyn RenderContext) -> Option<&'static str> {
    for marker in CAPTCHA_MARKERS {
        if let Ok(true) = ctx.exists(marker).await {
            return Some(marker);
        }
    }
    None
}
