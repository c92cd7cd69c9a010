//! Domain-aware reranking of fused hits

use super::{RetrievedPassage, SearchHit};
use taxlex_common::config::RerankConfig;
use taxlex_common::{Category, Passage};

/// Markers of a passage that contains a rate, formula or figure
const PASSAGE_CALCULATION_INDICATORS: &[&str] = &[
    "rate", "percentage", "calculate", "formula", "amount", "$", "%", "multiply", "divide",
    "total", "sum",
];

/// Applies additive bonuses and penalties to fused scores
#[derive(Debug, Clone)]
pub struct Reranker {
    config: RerankConfig,
    reference_year: i32,
}

impl Reranker {
    pub fn new(config: RerankConfig, reference_year: i32) -> Self {
        Self {
            config,
            reference_year,
        }
    }

    /// Score adjustment for one passage
    pub fn adjustment(&self, passage: &Passage, category: Category, calculation_query: bool) -> f32 {
        let mut adjustment = 0.0;

        if category.matches_act(&passage.act_name) {
            adjustment += self.config.act_match_bonus;
        }

        if calculation_query && has_calculation_content(&passage.text) {
            adjustment += self.config.calculation_bonus;
        }

        let earliest = self.reference_year - self.config.recency_window_years;
        if (earliest..=self.reference_year).any(|year| mentions_year(&passage.text, year)) {
            adjustment += self.config.recency_bonus;
        }

        if passage.word_count() < self.config.short_passage_words {
            adjustment -= self.config.short_passage_penalty;
        }

        adjustment
    }

    /// Rerank, sort best-first and keep at most `limit` passages
    pub fn rerank(
        &self,
        hits: &[SearchHit],
        passages: &[Passage],
        category: Category,
        calculation_query: bool,
        limit: usize,
    ) -> Vec<RetrievedPassage> {
        let mut ranked: Vec<(usize, RetrievedPassage)> = hits
            .iter()
            .filter_map(|hit| {
                let passage = passages.get(hit.doc)?;
                let final_score =
                    hit.fused_score + self.adjustment(passage, category, calculation_query);
                Some((
                    hit.doc,
                    RetrievedPassage {
                        passage: passage.clone(),
                        lexical_score: hit.lexical_score,
                        semantic_score: hit.semantic_score,
                        fused_score: hit.fused_score,
                        final_score,
                    },
                ))
            })
            .collect();

        ranked.sort_by(|(doc_a, a), (doc_b, b)| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(doc_a.cmp(doc_b))
        });
        ranked.truncate(limit);
        ranked.into_iter().map(|(_, p)| p).collect()
    }
}

fn has_calculation_content(text: &str) -> bool {
    let lower = text.to_lowercase();
    PASSAGE_CALCULATION_INDICATORS.iter().any(|i| lower.contains(i))
}

fn mentions_year(text: &str, year: i32) -> bool {
    let year = year.to_string();
    text.split(|c: char| !c.is_ascii_digit()).any(|token| token == year)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str, act: &str) -> Passage {
        Passage::new("p", text, act, Some("1".to_string()), Category::PayrollTax).unwrap()
    }

    fn long_text(words: usize) -> String {
        vec!["employer"; words].join(" ")
    }

    fn hit(doc: usize, fused_score: f32) -> SearchHit {
        SearchHit {
            fused_score,
            ..SearchHit::new(doc)
        }
    }

    fn reranker() -> Reranker {
        Reranker::new(RerankConfig::default(), 2025)
    }

    #[test]
    fn test_act_match_bonus() {
        let r = reranker();
        let text = long_text(60);
        let matching = r.adjustment(&passage(&text, "Payroll Tax Act 2007"), Category::PayrollTax, false);
        let other = r.adjustment(&passage(&text, "Duties Act 1997"), Category::PayrollTax, false);
        assert!((matching - 0.2).abs() < 1e-6);
        assert!(other.abs() < 1e-6);
    }

    #[test]
    fn test_calculation_bonus_needs_both_sides() {
        let r = reranker();
        let text = format!("{} the rate is 5.45%", long_text(60));
        let p = passage(&text, "Other Act 1990");
        assert!((r.adjustment(&p, Category::General, true) - 0.15).abs() < 1e-6);
        assert!(r.adjustment(&p, Category::General, false).abs() < 1e-6);
    }

    #[test]
    fn test_recency_bonus_window() {
        let r = reranker();
        let base = long_text(60);
        let recent = passage(&format!("{} amended in 2023.", base), "Other Act");
        let old = passage(&format!("{} amended in 2021.", base), "Other Act");
        assert!((r.adjustment(&recent, Category::General, false) - 0.1).abs() < 1e-6);
        assert!(r.adjustment(&old, Category::General, false).abs() < 1e-6);
    }

    #[test]
    fn test_short_passage_never_outranks_equal_long_one() {
        let r = reranker();
        let passages = vec![
            passage("Short employer passage.", "Payroll Tax Act 2007"),
            passage(&long_text(50), "Payroll Tax Act 2007"),
        ];
        let hits = vec![hit(0, 0.016), hit(1, 0.016)];

        let ranked = r.rerank(&hits, &passages, Category::PayrollTax, false, 5);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].passage.text, passages[1].text);
        assert!(ranked[0].final_score > ranked[1].final_score);
    }

    #[test]
    fn test_truncates_to_limit() {
        let r = reranker();
        let passages: Vec<Passage> = (0..8).map(|_| passage(&long_text(60), "X Act")).collect();
        let hits: Vec<SearchHit> = (0..8).map(|d| hit(d, 0.01 - d as f32 * 0.001)).collect();
        let ranked = r.rerank(&hits, &passages, Category::General, false, 5);
        assert_eq!(ranked.len(), 5);
        assert!(ranked.windows(2).all(|w| w[0].final_score >= w[1].final_score));
    }
}
