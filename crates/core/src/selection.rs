//! Dynamic k-selection strategies (§4.3).
//!
//! A [`SelectionStrategy`] decides, given a descending-sorted list of
//! scores, how many leading elements to keep. Strategies never see the
//! underlying items — only their scores — so they compose uniformly
//! across rule, scenario, and memory retrieval.

use serde::{Deserialize, Serialize};

/// Hard bounds applied after a strategy proposes a cut: never fewer than
/// `min_k` (when available), never more than `max_k`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectionBounds {
    pub min_k: usize,
    pub max_k: usize,
}

impl Default for SelectionBounds {
    fn default() -> Self {
        Self { min_k: 1, max_k: 20 }
    }
}

pub trait SelectionStrategy: Send + Sync {
    /// Propose a cut point given scores sorted descending. The returned
    /// value is clamped by [`select`](Self::select) against `bounds` and
    /// the list length, so implementations need not worry about
    /// out-of-range results.
    fn propose_cut(&self, scores: &[f32]) -> usize;

    /// Select the number of leading elements to keep, honoring `bounds`.
    fn select(&self, scores: &[f32], bounds: SelectionBounds) -> usize {
        if scores.is_empty() {
            return 0;
        }
        let proposed = self.propose_cut(scores);
        let min_k = bounds.min_k.min(scores.len());
        let max_k = bounds.max_k.min(scores.len());
        proposed.clamp(min_k, max_k.max(min_k))
    }
}

/// Keep exactly `k` items (fewer if the list is shorter), additionally
/// dropping any whose score falls below `min_score`.
#[derive(Debug, Clone, Copy)]
pub struct FixedK {
    pub k: usize,
    pub min_score: f32,
}

impl SelectionStrategy for FixedK {
    fn propose_cut(&self, scores: &[f32]) -> usize {
        scores
            .iter()
            .take(self.k)
            .take_while(|&&s| s >= self.min_score)
            .count()
    }
}

/// Cut at the first point where the relative drop between consecutive
/// scores exceeds `drop_threshold` (the "elbow" of the score curve).
#[derive(Debug, Clone, Copy)]
pub struct Elbow {
    pub drop_threshold: f32,
    pub min_score: f32,
}

impl SelectionStrategy for Elbow {
    fn propose_cut(&self, scores: &[f32]) -> usize {
        for i in 0..scores.len() {
            if scores[i] < self.min_score {
                return i;
            }
            if i > 0 {
                let prev = scores[i - 1];
                if prev > 0.0 {
                    let relative_drop = (prev - scores[i]) / prev;
                    if relative_drop > self.drop_threshold {
                        return i;
                    }
                }
            }
        }
        scores.len()
    }
}

/// Cut where the discrete second derivative (curvature) of the score
/// sequence peaks above `alpha`, i.e. where the score curve bends sharpest.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveK {
    pub alpha: f32,
    pub min_score: f32,
}

impl SelectionStrategy for AdaptiveK {
    fn propose_cut(&self, scores: &[f32]) -> usize {
        let valid = scores.iter().take_while(|&&s| s >= self.min_score).count();
        if valid < 3 {
            return valid;
        }
        let mut best_idx = valid;
        let mut best_curvature = self.alpha;
        for i in 1..valid - 1 {
            let curvature = scores[i - 1] - 2.0 * scores[i] + scores[i + 1];
            if curvature > best_curvature {
                best_curvature = curvature;
                best_idx = i + 1;
            }
        }
        best_idx
    }
}

/// Switch between a tight `low_k` and a loose `high_k` based on the
/// normalized Shannon entropy of the top scores: low entropy (one or two
/// scores dominate) keeps only `low_k`; high entropy (scores are close)
/// widens to `high_k`.
#[derive(Debug, Clone, Copy)]
pub struct EntropySelection {
    pub low_k: usize,
    pub high_k: usize,
    pub entropy_threshold: f32,
}

impl SelectionStrategy for EntropySelection {
    fn propose_cut(&self, scores: &[f32]) -> usize {
        let window = scores.len().min(self.high_k.max(self.low_k));
        if window == 0 {
            return 0;
        }
        let top = &scores[..window];
        let sum: f32 = top.iter().filter(|&&s| s > 0.0).sum();
        if sum <= 0.0 {
            return self.low_k.min(scores.len());
        }
        let entropy: f32 = top
            .iter()
            .filter(|&&s| s > 0.0)
            .map(|&s| {
                let p = s / sum;
                -p * p.ln()
            })
            .sum();
        let max_entropy = (window as f32).ln().max(f32::EPSILON);
        let normalized = entropy / max_entropy;
        if normalized >= self.entropy_threshold {
            self.high_k.min(scores.len())
        } else {
            self.low_k.min(scores.len())
        }
    }
}

/// Density-based (DBSCAN-style) clustering over the 1-D score sequence;
/// keeps the top `top_per_cluster` items from each cluster found.
#[derive(Debug, Clone, Copy)]
pub struct Cluster {
    pub eps: f32,
    pub min_samples: usize,
    pub top_per_cluster: usize,
}

impl SelectionStrategy for Cluster {
    fn propose_cut(&self, scores: &[f32]) -> usize {
        if scores.is_empty() {
            return 0;
        }
        // 1-D DBSCAN: scores are already sorted descending, so a cluster is a
        // maximal run of consecutive scores each within `eps` of the previous.
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        let mut current = vec![0usize];
        for i in 1..scores.len() {
            if (scores[i - 1] - scores[i]).abs() <= self.eps {
                current.push(i);
            } else {
                clusters.push(std::mem::take(&mut current));
                current.push(i);
            }
        }
        clusters.push(current);

        let mut kept = 0usize;
        for cluster in &clusters {
            if cluster.len() < self.min_samples {
                continue;
            }
            // Clusters are contiguous and sorted descending: keeping the
            // first `top_per_cluster` of each preserves overall order only
            // when clusters are taken in original sequence, which they are.
            kept = kept.max(cluster[0] + cluster.len().min(self.top_per_cluster));
        }
        kept.min(scores.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(min_k: usize, max_k: usize) -> SelectionBounds {
        SelectionBounds { min_k, max_k }
    }

    #[test]
    fn fixed_k_respects_min_score() {
        let scores = vec![0.9, 0.8, 0.2];
        let s = FixedK { k: 3, min_score: 0.5 };
        assert_eq!(s.select(&scores, bounds(0, 3)), 2);
    }

    #[test]
    fn min_k_floor_is_honored_even_below_min_score() {
        let scores = vec![0.9, 0.1, 0.05];
        let s = FixedK { k: 3, min_score: 0.5 };
        assert_eq!(s.select(&scores, bounds(2, 3)), 2);
    }

    #[test]
    fn max_k_ceiling_is_honored() {
        let scores = vec![0.9, 0.85, 0.8, 0.75];
        let s = FixedK { k: 4, min_score: 0.0 };
        assert_eq!(s.select(&scores, bounds(0, 2)), 2);
    }

    #[test]
    fn elbow_cuts_at_sharp_drop() {
        let scores = vec![0.95, 0.9, 0.85, 0.2, 0.1];
        let s = Elbow { drop_threshold: 0.4, min_score: 0.0 };
        assert_eq!(s.select(&scores, bounds(0, 10)), 3);
    }

    #[test]
    fn entropy_widens_when_scores_are_close() {
        let close = vec![0.5, 0.49, 0.48, 0.47, 0.46];
        let s = EntropySelection { low_k: 1, high_k: 5, entropy_threshold: 0.5 };
        assert_eq!(s.select(&close, bounds(0, 10)), 5);
    }

    #[test]
    fn cluster_groups_contiguous_similar_scores() {
        let scores = vec![0.9, 0.89, 0.5, 0.48, 0.1];
        let s = Cluster { eps: 0.05, min_samples: 2, top_per_cluster: 2 };
        let kept = s.select(&scores, bounds(0, 10));
        assert!(kept >= 2);
    }
}
