//! Vector math utilities shared by retrieval, scenario scoring, and
//! context extraction.

/// Cosine similarity between two equal-length vectors. Returns `0.0` for
/// zero-length vectors or dimension mismatch rather than panicking, since
/// callers run this over provider-supplied embeddings they do not control.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Euclidean (L2) distance between two equal-length vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Reciprocal rank fusion over several ranked id lists, used to merge dense
/// and sparse (BM25) retrieval results into one ranking.
///
/// `k` is the RRF damping constant (commonly 60). Each input slice is a
/// ranked list of ids, best first. Returns ids sorted by fused score
/// descending.
pub fn reciprocal_rank_fusion<T: std::hash::Hash + Eq + Clone>(
    rankings: &[Vec<T>],
    k: f32,
) -> Vec<(T, f32)> {
    use std::collections::HashMap;

    let mut scores: HashMap<T, f32> = HashMap::new();
    for ranking in rankings {
        for (rank, item) in ranking.iter().enumerate() {
            let contribution = 1.0 / (k + rank as f32 + 1.0);
            *scores.entry(item.clone()).or_insert(0.0) += contribution;
        }
    }
    let mut fused: Vec<(T, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_dimensions_return_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn rrf_rewards_items_ranked_highly_in_multiple_lists() {
        let dense = vec!["a", "b", "c"];
        let sparse = vec!["b", "a", "d"];
        let fused = reciprocal_rank_fusion(&[dense, sparse], 60.0);
        assert_eq!(fused[0].0, "a");
    }
}
