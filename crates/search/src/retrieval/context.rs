//! Near-duplicate removal and token-bounded context assembly

use super::RetrievedPassage;
use std::collections::HashSet;
use taxlex_common::config::RelevanceWeights;
use taxlex_common::text::word_count;
use tracing::debug;

/// Comparison key: the first `prefix_chars` characters, trimmed
pub fn prefix_key(text: &str, prefix_chars: usize) -> String {
    text.chars()
        .take(prefix_chars)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Drop passages whose leading characters repeat an earlier passage's.
/// The first occurrence wins, order is preserved.
pub fn deduplicate(passages: Vec<RetrievedPassage>, prefix_chars: usize) -> Vec<RetrievedPassage> {
    let mut seen = HashSet::new();
    let before = passages.len();
    let kept: Vec<RetrievedPassage> = passages
        .into_iter()
        .filter(|p| seen.insert(prefix_key(&p.passage.text, prefix_chars)))
        .collect();

    if kept.len() < before {
        debug!(removed = before - kept.len(), "Near-duplicate passages removed");
    }
    kept
}

/// Passages packed into the context window
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub passages: Vec<RetrievedPassage>,
    pub text: String,
    pub estimated_tokens: usize,
}

/// Packs ranked passages under a token budget
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    token_budget: usize,
    tokens_per_word: f32,
}

impl ContextAssembler {
    pub fn new(token_budget: usize, tokens_per_word: f32) -> Self {
        Self {
            token_budget,
            tokens_per_word,
        }
    }

    /// Estimated tokens of a text under this assembler's ratio
    pub fn estimate(&self, text: &str) -> f32 {
        word_count(text) as f32 * self.tokens_per_word
    }

    /// Concatenate `[Act, Section N]`-headed passages in rank order, stopping at
    /// the first passage that would push the estimate over budget. Passages are
    /// never truncated.
    pub fn assemble(&self, passages: Vec<RetrievedPassage>) -> AssembledContext {
        let mut blocks: Vec<String> = Vec::with_capacity(passages.len());
        let mut kept = Vec::with_capacity(passages.len());
        let mut words = 0usize;

        for passage in passages {
            let block = format!("{}\n{}", passage.passage.header(), passage.passage.text);
            let block_words = word_count(&block);

            if (words + block_words) as f32 * self.tokens_per_word > self.token_budget as f32 {
                debug!(
                    passage = %passage.passage.id,
                    used_words = words,
                    block_words = block_words,
                    "Context budget reached"
                );
                break;
            }

            words += block_words;
            blocks.push(block);
            kept.push(passage);
        }

        AssembledContext {
            passages: kept,
            text: blocks.join("\n\n"),
            estimated_tokens: (words as f32 * self.tokens_per_word).ceil() as usize,
        }
    }
}

/// `w_sim * mean similarity + w_cov * min(kept / max, 1) + w_cls * confidence`,
/// capped at 1.0; zero when nothing was kept
pub fn relevance_score(
    kept: &[RetrievedPassage],
    max_count: usize,
    classification_confidence: f32,
    weights: &RelevanceWeights,
) -> f32 {
    if kept.is_empty() {
        return 0.0;
    }

    let avg_similarity =
        kept.iter().map(|p| p.semantic_score).sum::<f32>() / kept.len() as f32;
    let coverage = (kept.len() as f32 / max_count.max(1) as f32).min(1.0);

    (weights.similarity * avg_similarity
        + weights.coverage * coverage
        + weights.classification * classification_confidence)
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxlex_common::{Category, Passage};

    fn retrieved(id: &str, text: &str, similarity: f32) -> RetrievedPassage {
        RetrievedPassage {
            passage: Passage::new(id, text, "Duties Act 1997", Some("31".to_string()), Category::Duties)
                .unwrap(),
            lexical_score: 0.0,
            semantic_score: similarity,
            fused_score: 0.0,
            final_score: 0.0,
        }
    }

    #[test]
    fn test_deduplicate_on_prefix() {
        let shared = "x".repeat(100);
        let passages = vec![
            retrieved("a", &format!("{} first tail", shared), 0.9),
            retrieved("b", "different passage", 0.8),
            retrieved("c", &format!("{} second tail", shared), 0.7),
        ];

        let kept = deduplicate(passages, 100);
        let ids: Vec<&str> = kept.iter().map(|p| p.passage.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_deduplicate_ignores_surrounding_whitespace() {
        let passages = vec![
            retrieved("a", "Duty is charged on transfers", 0.9),
            retrieved("b", "  Duty is charged on transfers", 0.8),
        ];
        // Prefixes differ in leading characters, so both stay
        assert_eq!(deduplicate(passages, 10).len(), 2);
    }

    #[test]
    fn test_assemble_formats_headers() {
        let assembler = ContextAssembler::new(2000, 1.3);
        let ctx = assembler.assemble(vec![retrieved("a", "Duty is charged at 5.5%.", 0.9)]);

        assert_eq!(ctx.text, "[Duties Act 1997, Section 31]\nDuty is charged at 5.5%.");
        assert_eq!(ctx.passages.len(), 1);
    }

    #[test]
    fn test_assemble_respects_budget() {
        let assembler = ContextAssembler::new(100, 1.3);
        let body = vec!["word"; 30].join(" ");
        let passages = (0..5).map(|i| retrieved(&i.to_string(), &body, 0.8)).collect();

        let ctx = assembler.assemble(passages);
        // Each block is 35 words (header 5 + body 30): two fit in 100 tokens, three do not
        assert_eq!(ctx.passages.len(), 2);
        assert!(assembler.estimate(&ctx.text) <= 100.0);
        assert!(ctx.estimated_tokens <= 100);
    }

    #[test]
    fn test_assemble_drops_oversized_passage_entirely() {
        let assembler = ContextAssembler::new(20, 1.3);
        let ctx = assembler.assemble(vec![retrieved("a", &vec!["word"; 40].join(" "), 0.9)]);
        assert!(ctx.passages.is_empty());
        assert!(ctx.text.is_empty());
        assert_eq!(ctx.estimated_tokens, 0);
    }

    #[test]
    fn test_relevance_score() {
        let weights = RelevanceWeights::default();
        assert_eq!(relevance_score(&[], 5, 0.9, &weights), 0.0);

        let kept = vec![retrieved("a", "x", 0.8), retrieved("b", "y", 0.6)];
        let score = relevance_score(&kept, 5, 1.0, &weights);
        let expected = 0.5 * 0.7 + 0.3 * 0.4 + 0.2 * 1.0;
        assert!((score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_relevance_capped() {
        let weights = RelevanceWeights {
            similarity: 1.0,
            coverage: 1.0,
            classification: 1.0,
        };
        let kept = vec![retrieved("a", "x", 1.0)];
        assert_eq!(relevance_score(&kept, 1, 1.0, &weights), 1.0);
    }
}
