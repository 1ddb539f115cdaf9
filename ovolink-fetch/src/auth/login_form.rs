//! Extraction of the auto-submit form returned by the password login.
//!
//! The identity provider answers a successful password login with an HTML
//! page holding a `<form>` whose hidden inputs must be posted back to its
//! `action`. This parsing depends on the provider's current markup, so it
//! sits behind [`FormExtractor`] and can be swapped without touching the
//! rest of the login flow.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::FetchError;

// ============================================================================
// Patterns
// ============================================================================

/// Opening `<form ...>` tag; quoted values may contain `>`.
static FORM_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<form\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("Invalid regex")
});

/// Any `<input ...>` tag; quoted values may contain `>`.
static INPUT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<input\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("Invalid regex")
});

/// One `name="value"` / `name='value'` / `name=value` attribute.
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("Invalid regex")
});

/// Named or numeric character reference.
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("Invalid regex")
});

// ============================================================================
// Types
// ============================================================================

/// The form to post back: target URL plus hidden fields in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    /// Entity-decoded `action` attribute.
    pub action: String,
    /// Entity-decoded hidden `(name, value)` pairs.
    pub fields: Vec<(String, String)>,
}

/// Parses the login response page.
pub trait FormExtractor: Send + Sync {
    /// Extracts the form `action` and hidden fields.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::AuthenticationFailed` if the page has no
    /// `action` or no hidden inputs.
    fn extract(&self, html: &str) -> Result<LoginForm, FetchError>;
}

/// Pattern-matching [`FormExtractor`] for the current markup.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexFormExtractor;

impl RegexFormExtractor {
    /// Creates the extractor.
    pub fn new() -> Self {
        Self
    }

    /// Every hidden input's `(name, value)`, entity-decoded.
    pub fn extract_hidden_fields(html: &str) -> Vec<(String, String)> {
        INPUT_TAG_RE
            .find_iter(html)
            .filter_map(|tag| {
                let attrs = attributes(tag.as_str());
                let is_hidden = attrs
                    .iter()
                    .any(|(k, v)| k == "type" && v.eq_ignore_ascii_case("hidden"));
                if !is_hidden {
                    return None;
                }
                let name = attrs.iter().find(|(k, _)| k == "name")?.1.clone();
                let value = attrs
                    .iter()
                    .find(|(k, _)| k == "value")
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                Some((decode_html_entities(&name), decode_html_entities(&value)))
            })
            .collect()
    }

    /// The first form's `action`, entity-decoded.
    pub fn extract_action(html: &str) -> Option<String> {
        let tag = FORM_TAG_RE.find(html)?;
        attributes(tag.as_str())
            .into_iter()
            .find(|(k, _)| k == "action")
            .map(|(_, v)| decode_html_entities(&v))
            .filter(|a| !a.trim().is_empty())
    }
}

impl FormExtractor for RegexFormExtractor {
    fn extract(&self, html: &str) -> Result<LoginForm, FetchError> {
        let action = Self::extract_action(html).ok_or_else(|| {
            FetchError::AuthenticationFailed("login response has no form action".to_string())
        })?;
        let fields = Self::extract_hidden_fields(html);
        if fields.is_empty() {
            return Err(FetchError::AuthenticationFailed(
                "login response has no hidden form fields".to_string(),
            ));
        }
        Ok(LoginForm { action, fields })
    }
}

/// Attributes of one tag, names lowercased, values raw.
fn attributes(tag: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(tag)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map_or("", |m| m.as_str());
            (c[1].to_ascii_lowercase(), value.to_string())
        })
        .collect()
}

/// Decodes named and numeric HTML character references.
///
/// Unknown references are left as they are.
pub fn decode_html_entities(input: &str) -> String {
    ENTITY_RE
        .replace_all(input, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

// ============================================================================
// Tests
// ============================================================================
