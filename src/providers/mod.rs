//! Generation provider implementations.
//!
//! Concrete [`TextGenerator`](crate::generate::TextGenerator) clients over
//! HTTP. Each provider enforces the request timeout and maps HTTP failures
//! to structured [`GenerationError`](crate::error::GenerationError)s; none
//! of them retries; a failed call surfaces to the caller unchanged.

pub mod claude;
pub mod openai;

/// Parse retry delay from error response (supports "4s", "4.5s", seconds as number)
pub fn parse_retry_delay(text: &str) -> Option<u32> {
    // Try to find "retryDelay": "Xs" pattern
    if let Some(idx) = text.find("retryDelay") {
        let after = &text[idx..];
        // Look for number followed by 's'
        for word in after.split_whitespace().take(5) {
            let clean = word.trim_matches(|c: char| !c.is_numeric() && c != '.');
            if let Ok(secs) = clean.parse::<f64>() {
                return Some(secs.ceil() as u32);
            }
        }
    }
    // Try to find "retry in X" pattern
    if let Some(idx) = text.find("retry in") {
        let after = &text[idx + 8..];
        for word in after.split_whitespace().take(3) {
            let clean = word.trim_matches(|c: char| !c.is_numeric() && c != '.');
            if let Ok(secs) = clean.parse::<f64>() {
                return Some(secs.ceil() as u32);
            }
        }
    }
    None
}

/// Truncate an error body for inclusion in a message
pub(crate) fn truncate_body(body: &str) -> &str {
    body.get(..200).unwrap_or(body)
}
