//! Vector similarity utilities for the in-memory document store.

use orgchat_core::RetrievalChunk;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank `(content, embedding)` pairs against `query`.
///
/// Keeps pairs strictly above `threshold`, most similar first, at most `count`.
pub fn rank_by_similarity<'a>(
    candidates: impl IntoIterator<Item = (&'a str, &'a [f32])>,
    query: &[f32],
    threshold: f32,
    count: usize,
) -> Vec<RetrievalChunk> {
    let mut scored: Vec<RetrievalChunk> = candidates
        .into_iter()
        .filter_map(|(content, embedding)| {
            let similarity = cosine_similarity(embedding, query);
            (similarity > threshold).then(|| RetrievalChunk::new(content, similarity))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(count);
    scored
}

/// Render an embedding as a pgvector literal (`[0.1,0.2]`).
pub fn to_pgvector(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors() {
        let sim = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn ranking_filters_sorts_and_truncates() {
        let a = [1.0, 0.0];
        let b = [0.9, 0.1];
        let c = [0.0, 1.0];
        let candidates = vec![("c", &c[..]), ("b", &b[..]), ("a", &a[..])];

        let ranked = rank_by_similarity(candidates, &[1.0, 0.0], 0.5, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].content, "a");
    }

    #[test]
    fn threshold_is_exclusive() {
        let a = [1.0, 0.0];
        let ranked = rank_by_similarity(vec![("a", &a[..])], &[1.0, 0.0], 1.0, 3);
        assert!(ranked.is_empty());
    }

    #[test]
    fn pgvector_literal() {
        assert_eq!(to_pgvector(&[0.5, -1.0]), "[0.5,-1]");
        assert_eq!(to_pgvector(&[]), "[]");
    }
}
