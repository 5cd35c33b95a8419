//! Content preprocessing for embedding generation.
//!
//! Prepares a post's title and body for embedding:
//! 1. Trim whitespace
//! 2. Join title and body with a blank line
//! 3. Truncate to a maximum number of characters

/// Default maximum input length (characters, not tokens).
///
/// Long posts are cut to bound encoding cost and memory; the tail of a long
/// post does not contribute to its vector.
pub const DEFAULT_MAX_CHARS: usize = 6000;

/// Compose the text that gets embedded for one document.
///
/// Returns `None` if the body is empty after trimming.
pub fn compose_text(title: Option<&str>, content: &str) -> Option<String> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => Some(format!("{}\n\n{}", title, content)),
        None => Some(content.to_string()),
    }
}

/// Truncate `text` to at most `max_chars` characters.
///
/// Counts Unicode scalar values so multi-byte text (e.g. Hangul) is never cut
/// in the middle of a UTF-8 sequence.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
