//! Token estimation utilities.
//!
//! Uses a character-based heuristic: 1 token ≈ 4 characters, rounded up.
//! A character is a UTF-16 code unit, so a character outside the Basic
//! Multilingual Plane (most emoji) counts as two. Existing budgets are
//! calibrated against this exact ratio, so it is not swapped for a real
//! tokenizer.

use orgchat_core::message::Message;

/// Estimate the token count for a string.
///
/// `ceil(utf16_len / 4)`. Empty text costs 0.
pub fn estimate_tokens(text: &str) -> usize {
    text_length(text).div_ceil(4)
}

/// Length of `text` in UTF-16 code units.
pub fn text_length(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Estimate tokens for a slice of messages (content only, no overhead).
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}
