//! JavaScript snippets for element interaction.
//!
//! ## Security: JS encoding
//!
//! Selectors and values come from model output and product data. They are
//! escaped for a JS string context and injected only into single-quoted
//! string literals, never into code positions.

/// Attribute used to tag a button located by its text.
pub const SUBMIT_TAG_ATTR: &str = "data-listing-submit";

pub fn is_visible(selector: &str) -> String {
    format!(
        r#"(() => {{
            let el;
            try {{ el = document.querySelector('{}'); }} catch (e) {{ return false; }}
            if (!el) return false;
            const style = window.getComputedStyle(el);
            if (style.display === 'none' || style.visibility === 'hidden') return false;
            const rect = el.getBoundingClientRect();
            return rect.width > 0 && rect.height > 0;
        }})()"#,
        sanitize_js_string(selector)
    )
}

pub fn exists(selector: &str) -> String {
    format!(
        r#"(() => {{
            try {{ return document.querySelector('{}') !== null; }} catch (e) {{ return false; }}
        }})()"#,
        sanitize_js_string(selector)
    )
}

pub fn clear_value(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            if (!el) return {{ success: false }};
            el.value = '';
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            return {{ success: true }};
        }})()"#,
        sanitize_js_string(selector)
    )
}

pub fn select_option(selector: &str, value: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            if (!el || el.tagName !== 'SELECT') return {{ success: false, reason: "select not found" }};
            const wanted = '{}';
            let opt = [...el.options].find(o => o.value === wanted);
            if (!opt) opt = [...el.options].find(o => o.text.trim().toLowerCase() === wanted.toLowerCase());
            if (!opt) return {{ success: false, reason: "no matching option" }};
            el.value = opt.value;
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ success: true }};
        }})()"#,
        sanitize_js_string(selector),
        sanitize_js_string(value)
    )
}

pub fn set_checked(selector: &str, checked: bool) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            if (!el) return {{ success: false }};
            if (el.checked !== {checked}) el.click();
            if (el.checked !== {checked}) el.checked = {checked};
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ success: true }};
        }})()"#,
        sanitize_js_string(selector)
    )
}

pub fn scroll_into_view(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            if (el) el.scrollIntoView({{ behavior: 'smooth', block: 'center' }});
            return el !== null;
        }})()"#,
        sanitize_js_string(selector)
    )
}

pub fn tag_button_with_text(text: &str) -> String {
    format!(
        r#"(() => {{
            const wanted = '{text}'.toLowerCase();
            const candidates = [...document.querySelectorAll('button, input[type="button"], input[type="submit"], a[role="button"]')];
            const el = candidates.find(b => {{
                const label = (b.innerText || b.value || '').trim().toLowerCase();
                if (!label.includes(wanted)) return false;
                const rect = b.getBoundingClientRect();
                return rect.width > 0 && rect.height > 0;
            }});
            if (!el) return null;
            el.setAttribute('{attr}', '1');
            return '[{attr}="1"]';
        }})()"#,
        text = sanitize_js_string(text),
        attr = SUBMIT_TAG_ATTR
    )
}

/// Sanitize a string for safe injection into a JavaScript string literal.
///
/// Escapes all characters that could break out of a JS string context:
/// - Backslashes, single/double quotes, backticks
/// - Newlines, carriage returns, tabs
/// - HTML script tags
/// - Null bytes
pub fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}
