//! Reciprocal Rank Fusion (RRF) for combining lexical and semantic rankings
//!
//! RRF is a simple but effective fusion method that:
//! - Doesn't require score normalization
//! - Works well with different scoring distributions
//! - Is robust to outliers
//!
//! `score(p) = w_sem / (k + rank_sem + 1) + w_lex / (k + rank_lex + 1)` with
//! zero-based ranks; a passage missing from a ranking gets nothing for it.

use super::SearchHit;
use std::collections::HashMap;
use taxlex_common::config::FusionConfig;

/// RRF fusion parameters
#[derive(Debug, Clone)]
pub struct RRFusion {
    /// Constant k (typically 60)
    pub k: f32,

    /// Weight for semantic results
    pub semantic_weight: f32,

    /// Weight for lexical results
    pub lexical_weight: f32,
}

impl Default for RRFusion {
    fn default() -> Self {
        Self::new(&FusionConfig::default())
    }
}

impl RRFusion {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            k: config.k,
            semantic_weight: config.semantic_weight,
            lexical_weight: config.lexical_weight,
        }
    }

    /// Create with custom weights
    pub fn with_weights(semantic_weight: f32, lexical_weight: f32) -> Self {
        Self {
            semantic_weight,
            lexical_weight,
            ..Self::default()
        }
    }

    fn contribution(&self, weight: f32, rank: Option<usize>) -> f32 {
        rank.map(|r| weight / (self.k + r as f32 + 1.0)).unwrap_or(0.0)
    }

    /// Fuse two best-first rankings of `(passage, score)` into hits sorted by
    /// fused score, ties broken by passage position
    pub fn fuse(&self, semantic: &[(usize, f32)], lexical: &[(usize, f32)]) -> Vec<SearchHit> {
        let mut hits: HashMap<usize, SearchHit> = HashMap::new();

        for (rank, &(doc, similarity)) in semantic.iter().enumerate() {
            let hit = hits.entry(doc).or_insert_with(|| SearchHit::new(doc));
            if hit.semantic_rank.is_none() {
                hit.semantic_rank = Some(rank);
                hit.semantic_score = similarity;
            }
        }

        for (rank, &(doc, score)) in lexical.iter().enumerate() {
            let hit = hits.entry(doc).or_insert_with(|| SearchHit::new(doc));
            if hit.lexical_rank.is_none() {
                hit.lexical_rank = Some(rank);
                hit.lexical_score = score;
            }
        }

        let mut results: Vec<SearchHit> = hits
            .into_values()
            .map(|mut hit| {
                hit.fused_score = self.contribution(self.semantic_weight, hit.semantic_rank)
                    + self.contribution(self.lexical_weight, hit.lexical_rank);
                hit
            })
            .collect();

        results.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.doc.cmp(&b.doc))
        });

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rrf_fusion() {
        let fusion = RRFusion::default();

        // Semantic: [A, B, C]
        // Lexical:  [B, A, D]
        // A and B appear in both; A wins on the heavier semantic weight
        let semantic = vec![(1, 0.9), (2, 0.8), (3, 0.7)];
        let lexical = vec![(2, 9.0), (1, 7.0), (4, 6.0)];

        let results = fusion.fuse(&semantic, &lexical);

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].doc, 1);
        assert_eq!(results[1].doc, 2);
        assert_eq!(results[1].semantic_rank, Some(1));
        assert_eq!(results[1].lexical_rank, Some(0));
    }

    #[test]
    fn test_exact_scores() {
        let fusion = RRFusion::default();
        let results = fusion.fuse(&[(7, 0.9)], &[(7, 3.0)]);

        let expected = 0.7 / 61.0 + 0.3 / 61.0;
        assert!((results[0].fused_score - expected).abs() < 1e-6);
        assert_eq!(results[0].semantic_score, 0.9);
        assert_eq!(results[0].lexical_score, 3.0);
    }

    #[test]
    fn test_missing_ranking_contributes_nothing() {
        let fusion = RRFusion::default();
        let results = fusion.fuse(&[], &[(3, 1.0)]);
        assert!((results[0].fused_score - 0.3 / 61.0).abs() < 1e-6);
        assert_eq!(results[0].semantic_rank, None);
    }

    #[test]
    fn test_top_in_both_rankings_gets_maximum() {
        let fusion = RRFusion::with_weights(0.5, 0.5);
        let semantic: Vec<(usize, f32)> = (0..20).map(|d| (d, 1.0 - d as f32 / 20.0)).collect();
        let lexical: Vec<(usize, f32)> = (0..20).rev().map(|d| (d, d as f32)).collect();
        let mut lexical_with_top = vec![(0, 100.0)];
        lexical_with_top.extend(lexical.into_iter().filter(|(d, _)| *d != 0));

        let results = fusion.fuse(&semantic, &lexical_with_top);
        let top = results.iter().find(|h| h.doc == 0).unwrap().fused_score;
        assert!(results.iter().all(|h| h.fused_score <= top));
        assert_eq!(results[0].doc, 0);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(RRFusion::default().fuse(&[], &[]).is_empty());
    }
}
