//! Search modes and result ranking.
//!
//! Plain similarity search returns the K stored chunks closest to the query.
//! The diversity-aware mode fetches a larger candidate set and re-ranks it by
//! maximal marginal relevance:
//!
//! ```text
//! MMR(c) = λ × sim(query, c) − (1 − λ) × max sim(c, s) for s in selected
//! ```
//!
//! λ = 1.0 is pure relevance, λ = 0.0 pure diversity. Candidates are picked
//! greedily; on equal MMR score the earlier (more relevant) candidate wins.

use crate::config::RetrievalConfig;
use crate::embedding::cosine_similarity;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    Similarity,
    Mmr { lambda: f32, fetch_k: usize },
}

impl SearchMode {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        match config.search_type.as_str() {
            "mmr" => SearchMode::Mmr {
                lambda: config.mmr_diversity.clamp(0.0, 1.0),
                fetch_k: config.top_k * config.fetch_k_multiplier.max(1),
            },
            _ => SearchMode::Similarity,
        }
    }

    /// Number of nearest neighbours to pull before any re-ranking.
    pub fn candidate_count(&self, k: usize) -> usize {
        match self {
            SearchMode::Similarity => k,
            SearchMode::Mmr { fetch_k, .. } => (*fetch_k).max(k),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SearchMode::Similarity => "similarity",
            SearchMode::Mmr { .. } => "mmr",
        }
    }
}

/// Indices of `scores` in descending order, truncated to `n`.
///
/// The sort is stable, so equal scores keep their input (insertion) order.
pub fn rank_by_score(scores: &[f32], n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order.truncate(n);
    order
}

/// Greedy MMR selection over candidates.
///
/// `relevance[i]` is candidate `i`'s similarity to the query and `vectors[i]`
/// its embedding. Returns up to `k` candidate indices in selection order.
pub fn mmr_select(relevance: &[f32], vectors: &[Vec<f32>], k: usize, lambda: f32) -> Vec<usize> {
    let n = relevance.len().min(vectors.len());
    let k = k.min(n);
    let mut selected: Vec<usize> = Vec::with_capacity(k);
    let mut remaining: Vec<usize> = (0..n).collect();

    while selected.len() < k {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &candidate) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(&vectors[candidate], &vectors[s]))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };

            let score = lambda * relevance[candidate] - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieval(search_type: &str, top_k: usize, lambda: f32) -> RetrievalConfig {
        RetrievalConfig {
            top_k,
            search_type: search_type.to_string(),
            mmr_diversity: lambda,
            fetch_k_multiplier: 2,
        }
    }

    #[test]
    fn mode_from_config() {
        assert_eq!(
            SearchMode::from_config(&retrieval("similarity", 4, 0.5)),
            SearchMode::Similarity
        );
        let mode = SearchMode::from_config(&retrieval("mmr", 4, 0.3));
        assert_eq!(mode, SearchMode::Mmr { lambda: 0.3, fetch_k: 8 });
        assert_eq!(mode.candidate_count(4), 8);
        assert_eq!(SearchMode::Similarity.candidate_count(4), 4);
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let scores = [0.2, 0.9, 0.5, 0.9, 0.1];
        assert_eq!(rank_by_score(&scores, 3), vec![1, 3, 2]);
        assert_eq!(rank_by_score(&scores, 10).len(), 5);
        assert!(rank_by_score(&[], 3).is_empty());
    }

    #[test]
    fn mmr_pure_relevance_keeps_order() {
        let relevance = vec![0.9, 0.8, 0.7];
        let vectors = vec![vec![1.0, 0.0], vec![1.0, 0.01], vec![0.0, 1.0]];
        assert_eq!(mmr_select(&relevance, &vectors, 3, 1.0), vec![0, 1, 2]);
    }

    #[test]
    fn mmr_prefers_diverse_candidate() {
        // candidates 0 and 1 are near-duplicates; 2 is less relevant but different
        let relevance = vec![0.95, 0.94, 0.70];
        let vectors = vec![vec![1.0, 0.0], vec![0.99, 0.01], vec![0.0, 1.0]];
        assert_eq!(mmr_select(&relevance, &vectors, 2, 0.5), vec![0, 2]);
    }

    #[test]
    fn mmr_handles_small_inputs() {
        assert!(mmr_select(&[], &[], 4, 0.5).is_empty());
        assert_eq!(mmr_select(&[0.3], &[vec![1.0]], 4, 0.5), vec![0]);
        assert!(mmr_select(&[0.3], &[vec![1.0]], 0, 0.5).is_empty());
    }
}
