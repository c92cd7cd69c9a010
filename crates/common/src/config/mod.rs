//! Configuration management for TaxLex
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values
//!
//! Every scoring weight and threshold used by classification, fusion, reranking and
//! context assembly lives here so it can be tuned without touching the algorithms.

use crate::errors::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    /// Embedding service configuration
    #[serde(default)]
    #[validate(nested)]
    pub embedding: EmbeddingConfig,

    /// Index build and artifact configuration
    #[serde(default)]
    #[validate(nested)]
    pub index: IndexConfig,

    /// Query classifier weights
    #[serde(default)]
    #[validate(nested)]
    pub classifier: ClassifierConfig,

    /// Hybrid retrieval configuration
    #[serde(default)]
    #[validate(nested)]
    pub retrieval: RetrievalConfig,

    /// Rate schedules for tax estimates
    #[serde(default)]
    #[validate(nested)]
    pub calculation: CalculationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EmbeddingConfig {
    /// Embedding provider: hashing, openai
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    #[validate(range(min = 1))]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests during index builds
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct IndexConfig {
    /// Directory holding statute markdown/text files
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,

    /// Directory holding persisted index generations
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// BM25 term-frequency saturation
    #[serde(default = "default_bm25_k1")]
    #[validate(range(min = 0.0))]
    pub bm25_k1: f32,

    /// BM25 length normalisation
    #[serde(default = "default_bm25_b")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub bm25_b: f32,

    /// Sections longer than this many characters are split further
    #[serde(default = "default_max_section_chars")]
    #[validate(range(min = 200))]
    pub max_section_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ClassifierConfig {
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,

    #[serde(default = "default_pattern_weight")]
    pub pattern_weight: f32,

    #[serde(default = "default_calculation_term_weight")]
    pub calculation_term_weight: f32,

    #[serde(default = "default_indicator_weight")]
    pub indicator_weight: f32,

    /// Best score that maps to full base confidence
    #[serde(default = "default_score_normalizer")]
    #[validate(range(min = 0.1))]
    pub score_normalizer: f32,

    #[serde(default = "default_jurisdiction_bonus")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub jurisdiction_bonus: f32,

    #[serde(default = "default_keyword_bonus_step")]
    pub keyword_bonus_step: f32,

    #[serde(default = "default_keyword_bonus_cap")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub keyword_bonus_cap: f32,

    #[serde(default = "default_competition_factor")]
    pub competition_factor: f32,

    #[serde(default = "default_competition_cap")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub competition_cap: f32,

    /// Below this confidence the query falls back to `general`
    #[serde(default = "default_min_confidence")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: f32,

    /// Confidence reported for the `general` fallback
    #[serde(default = "default_fallback_confidence")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub fallback_confidence: f32,

    #[serde(default = "default_secondary_min_score")]
    pub secondary_min_score: f32,

    #[serde(default = "default_max_secondary")]
    pub max_secondary: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RetrievalConfig {
    /// Passages kept per query
    #[serde(default = "default_max_chunks")]
    #[validate(range(min = 1))]
    pub max_chunks_per_query: usize,

    /// Similarity floor for the primary semantic search
    #[serde(default = "default_min_similarity")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_similarity: f32,

    /// Fewer primary hits than this triggers fallback
    #[serde(default = "default_sufficiency_min_hits")]
    pub sufficiency_min_hits: usize,

    /// Average primary similarity below this triggers fallback
    #[serde(default = "default_sufficiency_min_similarity")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub sufficiency_min_similarity: f32,

    #[serde(default = "default_fallback_relaxation")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub fallback_similarity_relaxation: f32,

    #[serde(default = "default_fallback_floor")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub fallback_similarity_floor: f32,

    /// Salient query terms searched individually during fallback
    #[serde(default = "default_max_key_terms")]
    pub max_key_terms: usize,

    /// Results kept per individual term search
    #[serde(default = "default_per_term_limit")]
    #[validate(range(min = 1))]
    pub per_term_limit: usize,

    #[serde(default = "default_per_term_min_similarity")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub per_term_min_similarity: f32,

    /// Leading characters compared for near-duplicate detection
    #[serde(default = "default_dedup_prefix_chars")]
    #[validate(range(min = 1))]
    pub dedup_prefix_chars: usize,

    #[serde(default = "default_context_token_budget")]
    #[validate(range(min = 1))]
    pub context_token_budget: usize,

    #[serde(default = "default_tokens_per_word")]
    #[validate(range(min = 0.1))]
    pub tokens_per_word: f32,

    /// Relevance below this marks the context as insufficient evidence
    #[serde(default = "default_insufficient_relevance")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub insufficient_relevance_threshold: f32,

    /// Year used for recency bonuses; current UTC year when unset
    #[serde(default)]
    pub reference_year: Option<i32>,

    #[serde(default)]
    #[validate(nested)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub rerank: RerankConfig,

    #[serde(default)]
    pub relevance: RelevanceWeights,
}

/// Weighted reciprocal rank fusion
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct FusionConfig {
    #[serde(default = "default_rrf_k")]
    #[validate(range(min = 0.0))]
    pub k: f32,

    #[serde(default = "default_semantic_weight")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub semantic_weight: f32,

    #[serde(default = "default_lexical_weight")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub lexical_weight: f32,
}

/// Additive domain adjustments applied after fusion
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankConfig {
    #[serde(default = "default_act_match_bonus")]
    pub act_match_bonus: f32,

    #[serde(default = "default_calculation_bonus")]
    pub calculation_bonus: f32,

    #[serde(default = "default_recency_bonus")]
    pub recency_bonus: f32,

    #[serde(default = "default_recency_window_years")]
    pub recency_window_years: i32,

    #[serde(default = "default_short_passage_penalty")]
    pub short_passage_penalty: f32,

    #[serde(default = "default_short_passage_words")]
    pub short_passage_words: usize,
}

/// Weights of the overall relevance score
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelevanceWeights {
    #[serde(default = "default_relevance_similarity")]
    pub similarity: f32,

    #[serde(default = "default_relevance_coverage")]
    pub coverage: f32,

    #[serde(default = "default_relevance_classification")]
    pub classification: f32,
}

/// One marginal band: `base + rate * (value - threshold)` for values above `threshold`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RateBand {
    pub threshold: f64,
    pub rate: f64,
    pub base: f64,
}

impl RateBand {
    pub const fn new(threshold: f64, rate: f64, base: f64) -> Self {
        Self { threshold, rate, base }
    }
}

/// Tax rate schedules, thresholds and concessions
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CalculationConfig {
    /// Land tax bands, ascending thresholds
    #[serde(default = "default_land_tax_bands")]
    pub land_tax_bands: Vec<RateBand>,

    /// Land value above which the premium property charge applies
    #[serde(default = "default_premium_property_threshold")]
    #[validate(range(min = 0.0))]
    pub premium_property_threshold: f64,

    /// Premium property charge, as a share of the whole land value
    #[serde(default = "default_premium_property_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub premium_property_rate: f64,

    /// Annual tax-free wages
    #[serde(default = "default_payroll_threshold")]
    #[validate(range(min = 0.0))]
    pub payroll_threshold: f64,

    #[serde(default = "default_payroll_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub payroll_rate: f64,

    /// Transfer duty bands, ascending thresholds
    #[serde(default = "default_duty_bands")]
    pub duty_bands: Vec<RateBand>,

    /// First home purchases up to this value pay no duty
    #[serde(default = "default_first_home_exemption_limit")]
    #[validate(range(min = 0.0))]
    pub first_home_exemption_limit: f64,

    /// First home purchases up to this value get a sliding concession
    #[serde(default = "default_first_home_concession_limit")]
    #[validate(range(min = 0.0))]
    pub first_home_concession_limit: f64,

    /// Surcharge duty for foreign purchasers, as a share of the value
    #[serde(default = "default_foreign_purchaser_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub foreign_purchaser_rate: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Prometheus exporter port; disabled when unset
    pub metrics_port: Option<u16>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_embedding_provider() -> String { "hashing".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 384 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 16 }
fn default_corpus_dir() -> PathBuf { PathBuf::from("data/legislation") }
fn default_artifact_dir() -> PathBuf { PathBuf::from("data/index") }
fn default_bm25_k1() -> f32 { 1.5 }
fn default_bm25_b() -> f32 { 0.75 }
fn default_max_section_chars() -> usize { 4000 }
fn default_keyword_weight() -> f32 { 1.0 }
fn default_pattern_weight() -> f32 { 1.5 }
fn default_calculation_term_weight() -> f32 { 0.5 }
fn default_indicator_weight() -> f32 { 0.3 }
fn default_score_normalizer() -> f32 { 5.0 }
fn default_jurisdiction_bonus() -> f32 { 0.2 }
fn default_keyword_bonus_step() -> f32 { 0.1 }
fn default_keyword_bonus_cap() -> f32 { 0.3 }
fn default_competition_factor() -> f32 { 0.3 }
fn default_competition_cap() -> f32 { 0.3 }
fn default_min_confidence() -> f32 { 0.3 }
fn default_fallback_confidence() -> f32 { 0.5 }
fn default_secondary_min_score() -> f32 { 0.1 }
fn default_max_secondary() -> usize { 3 }
fn default_max_chunks() -> usize { 5 }
fn default_min_similarity() -> f32 { 0.7 }
fn default_sufficiency_min_hits() -> usize { 3 }
fn default_sufficiency_min_similarity() -> f32 { 0.8 }
fn default_fallback_relaxation() -> f32 { 0.2 }
fn default_fallback_floor() -> f32 { 0.5 }
fn default_max_key_terms() -> usize { 3 }
fn default_per_term_limit() -> usize { 2 }
fn default_per_term_min_similarity() -> f32 { 0.6 }
fn default_dedup_prefix_chars() -> usize { 100 }
fn default_context_token_budget() -> usize { 2000 }
fn default_tokens_per_word() -> f32 { 1.3 }
fn default_insufficient_relevance() -> f32 { 0.3 }
fn default_rrf_k() -> f32 { 60.0 }
fn default_semantic_weight() -> f32 { 0.7 }
fn default_lexical_weight() -> f32 { 0.3 }
fn default_act_match_bonus() -> f32 { 0.2 }
fn default_calculation_bonus() -> f32 { 0.15 }
fn default_recency_bonus() -> f32 { 0.1 }
fn default_recency_window_years() -> i32 { 2 }
fn default_short_passage_penalty() -> f32 { 0.1 }
fn default_short_passage_words() -> usize { 50 }
fn default_relevance_similarity() -> f32 { 0.5 }
fn default_relevance_coverage() -> f32 { 0.3 }
fn default_relevance_classification() -> f32 { 0.2 }
fn default_land_tax_bands() -> Vec<RateBand> {
    vec![RateBand::new(969_000.0, 0.016, 0.0), RateBand::new(4_488_000.0, 0.02, 56_304.0)]
}
fn default_premium_property_threshold() -> f64 { 3_000_000.0 }
fn default_premium_property_rate() -> f64 { 0.02 }
fn default_payroll_threshold() -> f64 { 1_200_000.0 }
fn default_payroll_rate() -> f64 { 0.0545 }
fn default_duty_bands() -> Vec<RateBand> {
    vec![
        RateBand::new(0.0, 0.0125, 0.0),
        RateBand::new(14_000.0, 0.015, 175.0),
        RateBand::new(32_000.0, 0.0175, 445.0),
        RateBand::new(85_000.0, 0.035, 1_372.50),
        RateBand::new(319_000.0, 0.045, 9_562.50),
        RateBand::new(1_064_000.0, 0.055, 43_087.50),
    ]
}
fn default_first_home_exemption_limit() -> f64 { 650_000.0 }
fn default_first_home_concession_limit() -> f64 { 800_000.0 }
fn default_foreign_purchaser_rate() -> f64 { 0.08 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "taxlex".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__MAX_CHUNKS_PER_QUERY=8
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate_all()?;
        Ok(config)
    }

    /// Run field validation on every section
    pub fn validate_all(&self) -> Result<()> {
        self.validate()?;
        self.calculation.check_schedules()?;
        Ok(())
    }

    /// Get embedding request timeout as Duration
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            corpus_dir: default_corpus_dir(),
            artifact_dir: default_artifact_dir(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            max_section_chars: default_max_section_chars(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            keyword_weight: default_keyword_weight(),
            pattern_weight: default_pattern_weight(),
            calculation_term_weight: default_calculation_term_weight(),
            indicator_weight: default_indicator_weight(),
            score_normalizer: default_score_normalizer(),
            jurisdiction_bonus: default_jurisdiction_bonus(),
            keyword_bonus_step: default_keyword_bonus_step(),
            keyword_bonus_cap: default_keyword_bonus_cap(),
            competition_factor: default_competition_factor(),
            competition_cap: default_competition_cap(),
            min_confidence: default_min_confidence(),
            fallback_confidence: default_fallback_confidence(),
            secondary_min_score: default_secondary_min_score(),
            max_secondary: default_max_secondary(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_chunks_per_query: default_max_chunks(),
            min_similarity: default_min_similarity(),
            sufficiency_min_hits: default_sufficiency_min_hits(),
            sufficiency_min_similarity: default_sufficiency_min_similarity(),
            fallback_similarity_relaxation: default_fallback_relaxation(),
            fallback_similarity_floor: default_fallback_floor(),
            max_key_terms: default_max_key_terms(),
            per_term_limit: default_per_term_limit(),
            per_term_min_similarity: default_per_term_min_similarity(),
            dedup_prefix_chars: default_dedup_prefix_chars(),
            context_token_budget: default_context_token_budget(),
            tokens_per_word: default_tokens_per_word(),
            insufficient_relevance_threshold: default_insufficient_relevance(),
            reference_year: None,
            fusion: FusionConfig::default(),
            rerank: RerankConfig::default(),
            relevance: RelevanceWeights::default(),
        }
    }
}

impl RetrievalConfig {
    /// Similarity floor of the relaxed fallback search
    pub fn relaxed_similarity(&self) -> f32 {
        (self.min_similarity - self.fallback_similarity_relaxation)
            .max(self.fallback_similarity_floor)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k: default_rrf_k(),
            semantic_weight: default_semantic_weight(),
            lexical_weight: default_lexical_weight(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            act_match_bonus: default_act_match_bonus(),
            calculation_bonus: default_calculation_bonus(),
            recency_bonus: default_recency_bonus(),
            recency_window_years: default_recency_window_years(),
            short_passage_penalty: default_short_passage_penalty(),
            short_passage_words: default_short_passage_words(),
        }
    }
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            similarity: default_relevance_similarity(),
            coverage: default_relevance_coverage(),
            classification: default_relevance_classification(),
        }
    }
}

impl Default for CalculationConfig {
    fn default() -> Self {
        Self {
            land_tax_bands: default_land_tax_bands(),
            premium_property_threshold: default_premium_property_threshold(),
            premium_property_rate: default_premium_property_rate(),
            payroll_threshold: default_payroll_threshold(),
            payroll_rate: default_payroll_rate(),
            duty_bands: default_duty_bands(),
            first_home_exemption_limit: default_first_home_exemption_limit(),
            first_home_concession_limit: default_first_home_concession_limit(),
            foreign_purchaser_rate: default_foreign_purchaser_rate(),
        }
    }
}

impl CalculationConfig {
    /// Bands must be non-empty with strictly ascending thresholds, and the
    /// first home concession must end above the full exemption
    pub fn check_schedules(&self) -> Result<()> {
        for (name, bands) in [("land_tax_bands", &self.land_tax_bands), ("duty_bands", &self.duty_bands)] {
            if bands.is_empty() {
                return Err(AppError::Configuration {
                    message: format!("calculation.{} must not be empty", name),
                });
            }
            if bands.windows(2).any(|w| w[0].threshold >= w[1].threshold) {
                return Err(AppError::Configuration {
                    message: format!("calculation.{} thresholds must ascend", name),
                });
            }
        }
        if self.first_home_concession_limit <= self.first_home_exemption_limit {
            return Err(AppError::Configuration {
                message: "calculation.first_home_concession_limit must exceed the exemption limit"
                    .to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: None,
            service_name: default_service_name(),
        }
    }
}
