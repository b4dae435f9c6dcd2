//! Multipart boundary lookup (RFC 2046 §5.1.1) with RFC 2231 value decoding.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::charset::Charsets;
use crate::error::{HeaderError, Result};

/// `boundary=` up to the next `;` or the end of the line.
pub const DEFAULT_BOUNDARY_PATTERN: &str = r"(?i)boundary=([^;\n]*)";

static DEFAULT_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_BOUNDARY_PATTERN).expect("valid regex"));

pub fn default_boundary_regex() -> Regex {
    DEFAULT_BOUNDARY.clone()
}

/// Compile the boundary regex, or return the built-in one.
pub fn boundary_regex(pattern: Option<&str>) -> Result<Regex> {
    match pattern {
        Some(p) => Regex::new(p).map_err(|source| HeaderError::InvalidPattern {
            pattern: p.to_string(),
            source,
        }),
        None => Ok(default_boundary_regex()),
    }
}

/// First capture group of the first match of `re` in `haystack`.
pub fn first_capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Decode an RFC 2231 `charset'language'percent-encoded` value.
///
/// Values that are not in that form are returned unchanged. An empty
/// charset is taken as US-ASCII.
pub fn decode_extended_value(value: &str, charsets: &Charsets) -> String {
    let mut parts = value.splitn(3, '\'');
    let (Some(charset), Some(_language), Some(encoded)) = (parts.next(), parts.next(), parts.next())
    else {
        return value.to_string();
    };
    let charset = if charset.is_empty() { "us-ascii" } else { charset };
    let bytes: Vec<u8> = percent_encoding::percent_decode_str(encoded).collect();

    if charset.eq_ignore_ascii_case("utf-8") {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        debug!(charset, "Decoding RFC 2231 boundary value");
        charsets.to_utf8(&bytes, charset)
    }
}

/// Strip quoting and line-break artifacts left around a boundary value.
pub fn clean_boundary(value: &str) -> String {
    value
        .replace(['"', '\r', '\n', ';'], "")
        .replace("\\r", "")
        .replace("\\n", "")
        .replace("\\s", "")
}

/// Locate the boundary: the structured value when present and non-empty,
/// otherwise the first capture of `re` over the raw header text.
pub fn extract_boundary(
    structured: Option<&str>,
    raw: &str,
    re: &Regex,
    charsets: &Charsets,
) -> Option<String> {
    let found = match structured {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => first_capture(re, raw)?,
    };
    let cleaned = clean_boundary(&decode_extended_value(&found, charsets));
    (!cleaned.is_empty()).then_some(cleaned)
}
