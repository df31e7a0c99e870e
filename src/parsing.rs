//! Tolerant parsing of raw generator responses.
//!
//! Generators wrap JSON in code fences or commentary despite instructions
//! forbidding it, and failing hard on the first malformed response would
//! discard an expensive call. Three tiers, first success wins:
//!
//! 1. strip a surrounding ```/```json fence and parse directly
//! 2. brace-balanced extraction of the first top-level object
//! 3. give up on structure; the raw text becomes the content

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

// Surrounding code fence, optionally tagged `json`
static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*\n?(.*?)\n?\s*```\s*$").unwrap());

/// Strip a surrounding triple-backtick fence if the whole text is fenced.
pub fn strip_code_fence(raw: &str) -> &str {
    match RE_FENCE.captures(raw) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(raw),
        None => raw,
    }
}

/// Extract the first brace-balanced object from `text`.
///
/// Explicit state machine rather than a regex: nested braces inside string
/// values make this non-regular. Characters inside double-quoted strings are
/// opaque; a backslash consumes the following character and never toggles
/// string state.
pub fn extract_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Recover a JSON value from raw generator text, or `None` if no structure
/// can be found. Logs which recovery path was taken; callers degrade to the
/// raw text on `None`.
pub fn parse_response(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fence(raw).trim();

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Some(value);
    }

    if let Some(candidate) = extract_balanced_object(cleaned) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            log::warn!(
                "generator response was not pure JSON; extracted an object from surrounding text"
            );
            return Some(value);
        }
    }

    log::warn!("no JSON object found in generator response; falling back to raw text");
    None
}
