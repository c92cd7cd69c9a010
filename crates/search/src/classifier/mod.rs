//! Query Classifier - maps a free-text question to a revenue category
//!
//! Provides:
//! - Keyword and pattern scoring against the static category table
//! - Confidence with jurisdiction, keyword and competition adjustments
//! - Calculation-query detection, entity extraction and complexity
//!
//! Classification is a pure function of the query and the category table.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use taxlex_common::config::ClassifierConfig;
use taxlex_common::errors::{AppError, Result};
use taxlex_common::Category;
use tracing::{debug, warn};

/// Generic phrases suggesting the user wants a number
const CALCULATION_INDICATORS: &[&str] = &[
    "calculate", "calculation", "how much", "what is the", "rate", "percentage", "amount",
    "cost", "price", "total", "sum", "value", "worth",
];

/// Jurisdiction markers
const JURISDICTION_MARKERS: &[&str] = &["nsw", "new south wales", "revenue nsw", "state revenue"];

const NUMBER_PATTERNS: &[&str] = &[
    r"\$[\d,]+",
    r"\d+\.?\d*%",
    r"\d+\.?\d*\s*million",
    r"\d+,?\d*",
];

const SIMPLE_PATTERNS: &[&str] = &[r"^what is", r"^how much", r"^current rate"];

const COMPLEX_PATTERNS: &[&str] = &[
    r"calculate.*if",
    r"assuming.*and",
    r"multiple.*scenarios",
    r"compare.*options",
];

const WAGE_TERMS: &[&str] = &["monthly", "annual", "weekly", "wages", "salary"];

const PROPERTY_TERMS: &[&str] = &["residential", "commercial", "property", "home", "house"];

/// Score of one category for a query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: Category,
    pub score: f32,
}

/// Query classification result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Resolved category (`general` when degraded)
    pub category: Category,

    /// Confidence in [0, 1]; fixed at the fallback value when degraded
    pub confidence: f32,

    /// Confidence as computed, before any fallback
    pub raw_confidence: f32,

    /// Low-confidence default: the category is `general` by fallback, not by evidence
    pub degraded: bool,

    /// Distinct keywords matched across all categories
    pub keywords_matched: Vec<String>,

    /// Runner-up categories, best first
    pub secondary: Vec<CategoryScore>,

    /// Query asks for a rate, amount or other figure
    pub is_calculation: bool,

    pub jurisdiction_detected: bool,
}

/// Values pulled out of a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryEntities {
    /// Dollar and plain amounts with separators removed
    pub amounts: Vec<String>,
    /// Dollar figures in whole dollars, `$1.2 million` as 1200000
    pub dollar_values: Vec<f64>,
    pub percentages: Vec<String>,
    pub years: Vec<String>,
    pub dates: Vec<String>,
    pub wage_terms: Vec<String>,
    pub property_terms: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryComplexity {
    Simple,
    Moderate,
    Complex,
}

/// Deterministic keyword/pattern classifier
pub struct QueryClassifier {
    config: ClassifierConfig,

    /// Compiled case-insensitive patterns per scored category
    patterns: Vec<(Category, Vec<Regex>)>,

    number_patterns: Vec<Regex>,
    simple_patterns: Vec<Regex>,
    complex_patterns: Vec<Regex>,
    amount_pattern: Regex,
    dollar_pattern: Regex,
    percent_pattern: Regex,
    year_pattern: Regex,
    date_pattern: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){}", pattern)).map_err(|e| AppError::Configuration {
        message: format!("invalid pattern {:?}: {}", pattern, e),
    })
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile(p)).collect()
}

impl QueryClassifier {
    /// Create a classifier, compiling the category table patterns
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        let patterns = Category::SCORED
            .iter()
            .map(|category| Ok((*category, compile_all(category.profile().patterns)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            patterns,
            number_patterns: compile_all(NUMBER_PATTERNS)?,
            simple_patterns: compile_all(SIMPLE_PATTERNS)?,
            complex_patterns: compile_all(COMPLEX_PATTERNS)?,
            amount_pattern: compile(r"\$?([\d,]+(?:\.\d{2})?)")?,
            dollar_pattern: compile(r"\$\s?(\d[\d,]*(?:\.\d+)?)(?:\s*(million|thousand|m|k)\b)?")?,
            percent_pattern: compile(r"(\d+\.?\d*)%")?,
            year_pattern: compile(r"\b((?:19|20)\d{2})\b")?,
            date_pattern: compile(r"\b(\d{1,2}/\d{1,2}/\d{4})\b")?,
        })
    }

    /// Classify a query into a category with confidence
    pub fn classify(&self, query: &str) -> ClassificationResult {
        let query_lower = query.trim().to_lowercase();

        // Score each category; keywords are kept with repeats across categories
        let mut scores = Vec::with_capacity(self.patterns.len());
        let mut all_matched: Vec<&'static str> = Vec::new();

        for (category, patterns) in &self.patterns {
            let (score, matched) = self.category_score(&query_lower, *category, patterns);
            scores.push(CategoryScore {
                category: *category,
                score,
            });
            all_matched.extend(matched);
        }

        // First maximum in table order wins ties
        let best = scores
            .iter()
            .copied()
            .fold(None::<CategoryScore>, |best, s| match best {
                Some(b) if b.score >= s.score => Some(b),
                _ => Some(s),
            })
            .unwrap_or(CategoryScore {
                category: Category::General,
                score: 0.0,
            });

        let mut secondary: Vec<CategoryScore> = scores
            .iter()
            .copied()
            .filter(|s| s.category != best.category && s.score > self.config.secondary_min_score)
            .collect();
        // Stable sort keeps table order among equal scores
        secondary.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        secondary.truncate(self.config.max_secondary);

        let jurisdiction_detected = JURISDICTION_MARKERS.iter().any(|m| query_lower.contains(m));
        let raw_confidence =
            self.confidence(best.score, &scores, all_matched.len(), jurisdiction_detected);

        let degraded = raw_confidence < self.config.min_confidence;
        let (category, confidence) = if degraded {
            warn!(
                best_category = %best.category,
                raw_confidence = raw_confidence,
                "Classification degraded, falling back to general"
            );
            (Category::General, self.config.fallback_confidence)
        } else {
            (best.category, raw_confidence)
        };

        let keywords_matched: Vec<String> = all_matched
            .iter()
            .map(|k| k.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        debug!(
            category = %category,
            confidence = confidence,
            keywords = keywords_matched.len(),
            "Query classified"
        );

        ClassificationResult {
            category,
            confidence,
            raw_confidence,
            degraded,
            keywords_matched,
            secondary,
            is_calculation: self.is_calculation_query(query),
            jurisdiction_detected,
        }
    }

    fn category_score(
        &self,
        query: &str,
        category: Category,
        patterns: &[Regex],
    ) -> (f32, Vec<&'static str>) {
        let profile = category.profile();
        let mut score = 0.0;
        let mut matched = Vec::new();

        for keyword in profile.keywords {
            if query.contains(keyword) {
                score += self.config.keyword_weight;
                matched.push(*keyword);
            }
        }

        for pattern in patterns {
            if pattern.is_match(query) {
                score += self.config.pattern_weight;
            }
        }

        for term in profile.calculation_terms {
            if query.contains(term) {
                score += self.config.calculation_term_weight;
            }
        }

        for indicator in CALCULATION_INDICATORS {
            if query.contains(indicator) {
                score += self.config.indicator_weight;
            }
        }

        (score, matched)
    }

    fn confidence(
        &self,
        best_score: f32,
        scores: &[CategoryScore],
        keyword_matches: usize,
        jurisdiction_detected: bool,
    ) -> f32 {
        let c = &self.config;
        let base = (best_score / c.score_normalizer).min(1.0);
        let jurisdiction = if jurisdiction_detected { c.jurisdiction_bonus } else { 0.0 };
        let keyword_bonus = (keyword_matches as f32 * c.keyword_bonus_step).min(c.keyword_bonus_cap);

        let mut sorted: Vec<f32> = scores.iter().map(|s| s.score).collect();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let competition = match sorted.as_slice() {
            [first, second, ..] if *second > 0.0 => {
                (second / first * c.competition_factor).min(c.competition_cap)
            }
            _ => 0.0,
        };

        (base + jurisdiction + keyword_bonus - competition).clamp(0.0, 1.0)
    }

    /// Whether the query asks for a figure: indicator words or any number shape
    pub fn is_calculation_query(&self, query: &str) -> bool {
        let query_lower = query.to_lowercase();
        CALCULATION_INDICATORS.iter().any(|i| query_lower.contains(i))
            || self.number_patterns.iter().any(|p| p.is_match(&query_lower))
    }

    /// Extract amounts, percentages, dates and domain terms
    pub fn extract_entities(&self, query: &str, category: Category) -> QueryEntities {
        let query_lower = query.to_lowercase();
        let captures = |re: &Regex| -> Vec<String> {
            re.captures_iter(query)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect()
        };

        let amounts = captures(&self.amount_pattern)
            .into_iter()
            .map(|a| a.replace(',', ""))
            .filter(|a| !a.is_empty())
            .collect();

        let dollar_values = self
            .dollar_pattern
            .captures_iter(query)
            .filter_map(|c| {
                let value: f64 = c.get(1)?.as_str().replace(',', "").parse().ok()?;
                let scale = match c.get(2).map(|m| m.as_str().to_lowercase()).as_deref() {
                    Some("million") | Some("m") => 1_000_000.0,
                    Some("thousand") | Some("k") => 1_000.0,
                    _ => 1.0,
                };
                Some((value * scale * 100.0).round() / 100.0)
            })
            .collect();

        let present = |terms: &[&str]| -> Vec<String> {
            terms
                .iter()
                .filter(|t| query_lower.contains(*t))
                .map(|t| t.to_string())
                .collect()
        };

        QueryEntities {
            amounts,
            dollar_values,
            percentages: captures(&self.percent_pattern),
            years: captures(&self.year_pattern),
            dates: captures(&self.date_pattern),
            wage_terms: if category == Category::PayrollTax {
                present(WAGE_TERMS)
            } else {
                Vec::new()
            },
            property_terms: if category == Category::Duties {
                present(PROPERTY_TERMS)
            } else {
                Vec::new()
            },
        }
    }

    /// Rough complexity of the question
    pub fn complexity(&self, query: &str) -> QueryComplexity {
        let query_lower = query.to_lowercase();

        if self.complex_patterns.iter().any(|p| p.is_match(&query_lower)) {
            return QueryComplexity::Complex;
        }
        if self.simple_patterns.iter().any(|p| p.is_match(&query_lower)) {
            return QueryComplexity::Simple;
        }

        let words = query.split_whitespace().count();
        let inner_question = query
            .char_indices()
            .any(|(i, c)| c == '?' && i + c.len_utf8() < query.len());

        if words > 20 || inner_question {
            QueryComplexity::Complex
        } else if words < 8 {
            QueryComplexity::Simple
        } else {
            QueryComplexity::Moderate
        }
    }
}
