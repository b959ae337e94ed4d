//! Sentence-packing text splitter used by document ingestion.

use crate::context::text_length;

/// Split `text` into sentences: a sentence ends after `.`, `!` or `?`
/// when followed by whitespace. The whitespace run is consumed.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let end = i + c.len_utf8();
        if !chars.peek().is_some_and(|(_, next)| next.is_whitespace()) {
            continue;
        }

        out.push(&text[start..end]);
        start = end;
        while let Some((j, next)) = chars.peek().copied() {
            if !next.is_whitespace() {
                break;
            }
            start = j + next.len_utf8();
            chars.next();
        }
    }

    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Pack sentences greedily into chunks of at most `max_chars` characters.
/// Length is measured in UTF-16 code units, like the token estimate.
///
/// Sentences inside a chunk are joined by a single space. A sentence longer
/// than `max_chars` becomes a chunk of its own. Chunks are trimmed and never
/// empty; empty or whitespace-only input yields no chunks.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences(text) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let len = text_length(sentence);

        if current_len > 0 && current_len + 1 + len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(sentence);
        current_len += len;
    }

    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}
