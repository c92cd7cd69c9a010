//! Hybrid retrieval combining semantic and BM25 search
//!
//! Runs the query pipeline against a single index generation snapshot and uses
//! RRF fusion to combine both rankings.

use super::{
    context::{deduplicate, prefix_key, relevance_score, ContextAssembler},
    fusion::RRFusion,
    rerank::Reranker,
    Evidence, RetrievalContext, RetrievedPassage,
};
use crate::classifier::QueryClassifier;
use crate::index::{IndexGeneration, IndexStore};
use chrono::{Datelike, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use taxlex_common::config::RetrievalConfig;
use taxlex_common::errors::{AppError, Result, RetrievalStage};
use taxlex_common::metrics::{record_classification, RetrievalMetrics};
use taxlex_common::text::tokenize;
use taxlex_common::{Category, Embedder};
use tracing::{debug, info, instrument, warn};

/// Passages found so far, in discovery order
#[derive(Debug, Default)]
struct Candidates {
    order: Vec<usize>,
    seen: HashSet<usize>,
}

impl Candidates {
    fn extend(&mut self, hits: &[(usize, f32)]) {
        for &(doc, _) in hits {
            if self.seen.insert(doc) {
                self.order.push(doc);
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Best-first, ties on passage position
fn sort_ranking(ranking: &mut [(usize, f32)]) {
    ranking.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}

/// Hybrid retriever over the published index generation
pub struct HybridRetriever {
    store: Arc<IndexStore>,
    embedder: Arc<dyn Embedder>,
    classifier: QueryClassifier,
    config: RetrievalConfig,
    fusion: RRFusion,
    reranker: Reranker,
    assembler: ContextAssembler,
}

impl HybridRetriever {
    /// Create a new hybrid retriever
    pub fn new(
        store: Arc<IndexStore>,
        embedder: Arc<dyn Embedder>,
        classifier: QueryClassifier,
        config: RetrievalConfig,
    ) -> Self {
        let reference_year = config.reference_year.unwrap_or_else(|| Utc::now().year());

        Self {
            fusion: RRFusion::new(&config.fusion),
            reranker: Reranker::new(config.rerank.clone(), reference_year),
            assembler: ContextAssembler::new(config.context_token_budget, config.tokens_per_word),
            store,
            embedder,
            classifier,
            config,
        }
    }

    pub fn classifier(&self) -> &QueryClassifier {
        &self.classifier
    }

    /// Retrieve the context for a question.
    ///
    /// An empty result is a valid context marked [`Evidence::Insufficient`];
    /// errors carry the stage that failed.
    #[instrument(skip(self), fields(query_len = query.len()))]
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalContext> {
        let metrics = RetrievalMetrics::start();

        match self.run(query, &metrics).await {
            Ok(context) => {
                metrics.finish(
                    context.category.as_str(),
                    context.retrieved_chunks.len(),
                    context.fallback_used,
                );
                Ok(context)
            }
            Err(e) => {
                let stage = e.stage().map(|s| s.as_str()).unwrap_or("input");
                warn!(stage = stage, error = %e, "Retrieval failed");
                metrics.fail(stage);
                Err(e)
            }
        }
    }

    async fn run(&self, query: &str, metrics: &RetrievalMetrics) -> Result<RetrievalContext> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation {
                message: "Query must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }

        // Classify
        let classification = self.classifier.classify(query);
        record_classification(classification.category.as_str(), classification.degraded);
        let category = classification.category;

        // One snapshot serves every lookup below
        let generation = self
            .store
            .snapshot()
            .await
            .map_err(|e| e.at_stage(RetrievalStage::PrimarySearch))?;

        // PrimarySearch
        let query_terms = tokenize(query);
        let scope = category.has_act_preference().then_some(category);

        let (embedded, lexical_primary) = tokio::join!(self.embedder.embed(query), async {
            self.lexical_search(&generation, &query_terms, scope)
        });
        let query_vector = embedded
            .and_then(|v| generation.semantic().prepare_query(v))
            .map_err(|e| e.at_stage(RetrievalStage::PrimarySearch))?;
        let mut semantic_primary = self.semantic_search(&generation, &query_vector, scope);
        let mut lexical_primary = lexical_primary;

        if semantic_primary.is_empty() && lexical_primary.is_empty() && scope.is_some() {
            debug!(category = %category, "No passages in category scope, searching all passages");
            semantic_primary = self.semantic_search(&generation, &query_vector, None);
            lexical_primary = self.lexical_search(&generation, &query_terms, None);
        }

        // Primary hits are the fused top passages, capped like the final context
        let primary: Vec<(usize, f32)> = self
            .fusion
            .fuse(&semantic_primary, &lexical_primary)
            .into_iter()
            .take(self.config.max_chunks_per_query)
            .map(|hit| (hit.doc, generation.semantic().similarity(hit.doc, &query_vector)))
            .collect();

        let mut candidates = Candidates::default();
        candidates.extend(&primary);

        // EvaluateSufficiency
        let primary_hits = primary.len();
        let avg_similarity = if primary_hits == 0 {
            0.0
        } else {
            primary.iter().map(|(_, similarity)| similarity).sum::<f32>() / primary_hits as f32
        };
        let fallback_used = primary_hits < self.config.sufficiency_min_hits
            || avg_similarity < self.config.sufficiency_min_similarity;

        info!(
            category = %category,
            confidence = classification.confidence,
            primary_hits = primary_hits,
            avg_similarity = avg_similarity,
            fallback = fallback_used,
            "Primary search complete"
        );

        // FallbackSearch
        let mut ranking_terms = query_terms.clone();
        if fallback_used {
            let secondary: Vec<Category> =
                classification.secondary.iter().map(|s| s.category).collect();
            let expansion = self
                .fallback_search(&generation, query, category, &secondary, &query_vector, &mut candidates)
                .await
                .map_err(|e| e.at_stage(RetrievalStage::FallbackSearch))?;
            for term in expansion {
                if !ranking_terms.contains(&term) {
                    ranking_terms.push(term);
                }
            }
        }

        // Fuse
        let docs = self.unique_candidates(&generation, &candidates);
        let mut semantic_ranking: Vec<(usize, f32)> = docs
            .iter()
            .map(|&doc| (doc, generation.semantic().similarity(doc, &query_vector)))
            .filter(|(_, similarity)| *similarity > 0.0)
            .collect();
        sort_ranking(&mut semantic_ranking);

        let lexical_scores = generation.lexical().score(&ranking_terms);
        let mut lexical_ranking: Vec<(usize, f32)> = docs
            .iter()
            .filter_map(|doc| lexical_scores.get(doc).map(|score| (*doc, *score)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        sort_ranking(&mut lexical_ranking);

        let hits = self.fusion.fuse(&semantic_ranking, &lexical_ranking);

        // Rerank
        let reranked = self.reranker.rerank(
            &hits,
            generation.passages(),
            category,
            classification.is_calculation,
            self.config.max_chunks_per_query,
        );

        // Deduplicate
        let unique = deduplicate(reranked, self.config.dedup_prefix_chars);

        // AssembleContext
        let assembled = self.assembler.assemble(unique);
        let relevance = relevance_score(
            &assembled.passages,
            self.config.max_chunks_per_query,
            classification.confidence,
            &self.config.relevance,
        );
        let evidence = self.evidence(&assembled.passages, relevance);

        info!(
            candidates = docs.len(),
            fused = hits.len(),
            kept = assembled.passages.len(),
            tokens = assembled.estimated_tokens,
            relevance = relevance,
            evidence = ?evidence,
            "Context assembled"
        );

        Ok(RetrievalContext {
            query: query.to_string(),
            category,
            classification_confidence: classification.confidence,
            classification_degraded: classification.degraded,
            retrieved_chunks: assembled.passages,
            total_search_time_ms: metrics.elapsed_ms(),
            context_text: assembled.text,
            estimated_tokens: assembled.estimated_tokens,
            relevance_score: relevance,
            fallback_used,
            evidence,
            generation_id: generation.id(),
        })
    }

    fn evidence(&self, kept: &[RetrievedPassage], relevance: f32) -> Evidence {
        if kept.is_empty() || relevance < self.config.insufficient_relevance_threshold {
            Evidence::Insufficient
        } else {
            Evidence::Sufficient
        }
    }

    fn lexical_search(
        &self,
        generation: &IndexGeneration,
        terms: &[String],
        scope: Option<Category>,
    ) -> Vec<(usize, f32)> {
        let passages = generation.passages();
        let results = generation.lexical().search_terms(terms, self.config.max_chunks_per_query, |doc| {
            scope.map_or(true, |c| passages[doc].category == c)
        });
        debug!(hits = results.len(), scoped = scope.is_some(), "Lexical search");
        results
    }

    fn semantic_search(
        &self,
        generation: &IndexGeneration,
        query_vector: &[f32],
        scope: Option<Category>,
    ) -> Vec<(usize, f32)> {
        let passages = generation.passages();
        let results = generation.semantic().search(
            query_vector,
            self.config.max_chunks_per_query,
            self.config.min_similarity,
            |doc| scope.map_or(true, |c| passages[doc].category == c),
        );
        debug!(hits = results.len(), scoped = scope.is_some(), "Semantic search");
        results
    }

    /// Relaxed semantic search over all passages and within each runner-up
    /// category, then small per-term searches.
    /// Returns the tokens of the key terms for lexical ranking.
    async fn fallback_search(
        &self,
        generation: &IndexGeneration,
        query: &str,
        category: Category,
        secondary: &[Category],
        query_vector: &[f32],
        candidates: &mut Candidates,
    ) -> Result<Vec<String>> {
        let relaxed = self.relaxed_search(generation, query_vector, None);
        candidates.extend(&relaxed);

        for &runner_up in secondary {
            candidates.extend(&self.relaxed_search(generation, query_vector, Some(runner_up)));
        }

        let key_terms = self.key_terms(query, category);
        if key_terms.is_empty() {
            return Ok(Vec::new());
        }

        let term_vectors = self.embedder.embed_batch(&key_terms).await?;
        if term_vectors.len() != key_terms.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "expected {} embeddings, received {}",
                    key_terms.len(),
                    term_vectors.len()
                ),
            });
        }

        let mut expansion = Vec::new();
        for (term, vector) in key_terms.iter().zip(term_vectors) {
            let term_tokens = tokenize(term);
            let lexical = generation
                .lexical()
                .search_terms(&term_tokens, self.config.per_term_limit, |_| true);

            let vector = generation.semantic().prepare_query(vector)?;
            let semantic = generation.semantic().search(
                &vector,
                self.config.per_term_limit,
                self.config.per_term_min_similarity,
                |_| true,
            );

            debug!(term = %term, lexical = lexical.len(), semantic = semantic.len(), "Term search");
            candidates.extend(&lexical);
            candidates.extend(&semantic);
            expansion.extend(term_tokens);
        }

        Ok(expansion)
    }

    fn relaxed_search(
        &self,
        generation: &IndexGeneration,
        query_vector: &[f32],
        scope: Option<Category>,
    ) -> Vec<(usize, f32)> {
        let passages = generation.passages();
        let results = generation.semantic().search(
            query_vector,
            self.config.max_chunks_per_query,
            self.config.relaxed_similarity(),
            |doc| scope.map_or(true, |c| passages[doc].category == c),
        );
        debug!(
            hits = results.len(),
            scope = scope.map(|c| c.as_str()).unwrap_or("all"),
            min_similarity = self.config.relaxed_similarity(),
            "Relaxed semantic search"
        );
        results
    }

    /// Up to `max_key_terms` salient query terms, then the category's boost terms
    fn key_terms(&self, query: &str, category: Category) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        let query_terms = tokenize(query)
            .into_iter()
            .filter(|t| t.chars().count() > 2);
        let boost_terms = category.profile().boost_terms.iter().map(|t| t.to_string());

        for term in query_terms.chain(boost_terms) {
            if terms.len() == self.config.max_key_terms {
                break;
            }
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        terms
    }

    /// Candidate positions with near-duplicate passages removed, first seen wins
    fn unique_candidates(&self, generation: &IndexGeneration, candidates: &Candidates) -> Vec<usize> {
        let mut prefixes: HashMap<String, usize> = HashMap::new();
        let passages = generation.passages();

        candidates
            .order
            .iter()
            .copied()
            .filter(|&doc| {
                let key = prefix_key(&passages[doc].text, self.config.dedup_prefix_chars);
                *prefixes.entry(key).or_insert(doc) == doc
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use crate::test_support::{fixture_passages, PAYROLL_QUERY};
    use async_trait::async_trait;
    use taxlex_common::config::{ClassifierConfig, IndexConfig};
    use taxlex_common::embeddings::HashingEmbedder;
    use taxlex_common::Passage;

    const DIMENSION: usize = 384;

    /// Embeds a text as the vector of the first marker word it contains
    struct MarkerEmbedder {
        markers: Vec<(&'static str, Vec<f32>)>,
        otherwise: Vec<f32>,
    }

    impl MarkerEmbedder {
        fn vector(&self, text: &str) -> Vec<f32> {
            self.markers
                .iter()
                .find(|(marker, _)| text.contains(marker))
                .map(|(_, vector)| vector.clone())
                .unwrap_or_else(|| self.otherwise.clone())
        }
    }

    #[async_trait]
    impl Embedder for MarkerEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self.vector(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| self.vector(t)).collect())
        }

        fn model_name(&self) -> &str {
            "marker"
        }

        fn dimension(&self) -> usize {
            self.otherwise.len()
        }
    }

    fn passage(id: String, text: String, category: Category) -> Passage {
        Passage::new(id, text, "Register of Entries", None, category).unwrap()
    }

    /// Builds indexes normally but fails every query-time embedding
    struct QueryFailingEmbedder(HashingEmbedder);

    #[async_trait]
    impl Embedder for QueryFailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AppError::EmbeddingTimeout { timeout_ms: 30_000 })
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.0.embed_batch(texts).await
        }

        fn model_name(&self) -> &str {
            self.0.model_name()
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }
    }

    fn config() -> RetrievalConfig {
        RetrievalConfig {
            reference_year: Some(2025),
            ..RetrievalConfig::default()
        }
    }

    async fn retriever_with(embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> HybridRetriever {
        retriever_over(fixture_passages(), embedder, config).await
    }

    async fn retriever_over(
        passages: Vec<Passage>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> HybridRetriever {
        let builder = IndexBuilder::new(embedder.clone(), &IndexConfig::default(), 4);
        let generation = builder.build(passages).await.unwrap();
        let store = Arc::new(IndexStore::new());
        store.publish(generation).await;

        let classifier = QueryClassifier::new(ClassifierConfig::default()).unwrap();
        HybridRetriever::new(store, embedder, classifier, config)
    }

    async fn retriever() -> HybridRetriever {
        retriever_with(Arc::new(HashingEmbedder::new(DIMENSION)), config()).await
    }

    #[tokio::test]
    async fn test_payroll_rate_query() {
        let retriever = retriever().await;
        let ctx = retriever.retrieve(PAYROLL_QUERY).await.unwrap();

        assert_eq!(ctx.category, Category::PayrollTax);
        assert!(ctx.classification_confidence >= 0.6);
        assert!(ctx.passages().any(|p| p.act_name.contains("Payroll Tax")));
        assert!(ctx.context_text.contains("5.45%"));
        assert!(ctx.context_text.starts_with("[Payroll Tax Act 2007, Section"));
        assert!(ctx.relevance_score > 0.0 && ctx.relevance_score <= 1.0);
    }

    #[tokio::test]
    async fn test_unrelated_query_yields_insufficient_evidence() {
        let retriever = retriever().await;
        let ctx = retriever.retrieve("What is the weather today?").await.unwrap();

        assert_eq!(ctx.category, Category::General);
        assert_eq!(ctx.classification_confidence, 0.5);
        assert!(ctx.classification_degraded);
        assert!(ctx.retrieved_chunks.is_empty());
        assert!(ctx.context_text.is_empty());
        assert_eq!(ctx.relevance_score, 0.0);
        assert_eq!(ctx.evidence, Evidence::Insufficient);
        assert!(ctx.fallback_used);
    }

    #[tokio::test]
    async fn test_retrieval_is_deterministic() {
        let retriever = retriever().await;
        let first = retriever.retrieve(PAYROLL_QUERY).await.unwrap();
        let second = retriever.retrieve(PAYROLL_QUERY).await.unwrap();

        assert_eq!(first.retrieved_chunks, second.retrieved_chunks);
        assert_eq!(first.context_text, second.context_text);
        assert_eq!(first.relevance_score, second.relevance_score);
        assert_eq!(first.generation_id, second.generation_id);
    }

    #[tokio::test]
    async fn test_sparse_primary_results_trigger_fallback() {
        let retriever = retriever().await;
        let ctx = retriever.retrieve(PAYROLL_QUERY).await.unwrap();
        // Only three passages carry the payroll category
        assert!(ctx.fallback_used);
    }

    #[tokio::test]
    async fn test_near_duplicates_never_both_returned() {
        let retriever = retriever().await;
        let ctx = retriever
            .retrieve("How is payroll tax calculated on taxable wages paid by an employer?")
            .await
            .unwrap();

        let prefixes: HashSet<String> = ctx.passages().map(|p| prefix_key(&p.text, 100)).collect();
        assert_eq!(prefixes.len(), ctx.retrieved_chunks.len());
        assert!(!ctx.retrieved_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_context_respects_token_budget() {
        let budget = 60;
        let config = RetrievalConfig {
            context_token_budget: budget,
            ..config()
        };
        let retriever = retriever_with(Arc::new(HashingEmbedder::new(DIMENSION)), config).await;
        let ctx = retriever
            .retrieve("land tax on the unimproved value of land in NSW")
            .await
            .unwrap();

        assert!(ctx.estimated_tokens <= budget);
        assert!(ctx.retrieved_chunks.len() <= 5);
    }

    #[tokio::test]
    async fn test_scores_are_ordered() {
        let retriever = retriever().await;
        let ctx = retriever.retrieve("transfer duty on a conveyance of land").await.unwrap();
        assert!(ctx
            .retrieved_chunks
            .windows(2)
            .all(|w| w[0].final_score >= w[1].final_score));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let retriever = retriever().await;
        let err = retriever.retrieve("   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_unpublished_index_is_unavailable() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIMENSION));
        let classifier = QueryClassifier::new(ClassifierConfig::default()).unwrap();
        let retriever = HybridRetriever::new(Arc::new(IndexStore::new()), embedder, classifier, config());

        let err = retriever.retrieve(PAYROLL_QUERY).await.unwrap_err();
        assert_eq!(err.stage(), Some(RetrievalStage::PrimarySearch));
        assert!(err.needs_rebuild());
    }

    #[tokio::test]
    async fn test_query_embedding_failure_is_typed() {
        let embedder = Arc::new(QueryFailingEmbedder(HashingEmbedder::new(DIMENSION)));
        let retriever = retriever_with(embedder, config()).await;

        let err = retriever.retrieve(PAYROLL_QUERY).await.unwrap_err();
        assert_eq!(err.stage(), Some(RetrievalStage::PrimarySearch));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_key_terms_include_boost_terms() {
        let retriever = retriever().await;
        assert_eq!(
            retriever.key_terms("Is a stamp payable?", Category::Duties),
            vec!["stamp".to_string(), "payable".to_string(), "duty".to_string()]
        );
        assert_eq!(
            retriever.key_terms("payroll", Category::PayrollTax),
            vec!["payroll".to_string(), "wages".to_string(), "employer".to_string()]
        );
    }

    #[tokio::test]
    async fn test_primary_hits_capped_before_sufficiency() {
        // Five passages match the query only by meaning, five only by words
        let mut passages = Vec::new();
        for i in 0..5 {
            passages.push(passage(
                format!("meaning-{}", i),
                format!("Remuneration obligations ¶ schedule entry number {}.", i),
                Category::PayrollTax,
            ));
        }
        for i in 0..5 {
            passages.push(passage(
                format!("words-{}", i),
                format!("Payroll tax rate on wages, register line {}.", i),
                Category::PayrollTax,
            ));
        }
        let embedder = Arc::new(MarkerEmbedder {
            markers: vec![("¶", vec![1.0, 0.0])],
            otherwise: vec![0.0, 1.0],
        });
        let retriever = retriever_over(passages, embedder, config()).await;

        let ctx = retriever
            .retrieve("What is the payroll tax rate on wages? ¶")
            .await
            .unwrap();

        assert_eq!(ctx.category, Category::PayrollTax);
        assert!(!ctx.fallback_used);
        assert!(!ctx.retrieved_chunks.is_empty());
        assert!(ctx.retrieved_chunks.len() <= 5);
        assert!(ctx.passages().all(|p| p.id.starts_with("meaning-")));
    }

    #[tokio::test]
    async fn test_fallback_searches_runner_up_categories() {
        let mut passages: Vec<Passage> = (0..6)
            .map(|i| passage(format!("alpha-{}", i), format!("alpha register entry {}", i), Category::General))
            .collect();
        passages.push(passage("beta".to_string(), "beta register entry".to_string(), Category::Duties));
        let embedder = Arc::new(MarkerEmbedder {
            markers: vec![("alpha", vec![1.0, 0.0, 0.0]), ("beta", vec![0.8, 0.6, 0.0])],
            otherwise: vec![0.0, 0.0, 1.0],
        });
        let retriever = retriever_over(passages, embedder, config()).await;
        let generation = retriever.store.snapshot().await.unwrap();
        let beta = 6;

        let mut unscoped = Candidates::default();
        retriever
            .fallback_search(&generation, "alpha", Category::LandTax, &[], &[1.0, 0.0, 0.0], &mut unscoped)
            .await
            .unwrap();
        assert!(!unscoped.seen.contains(&beta));

        let mut with_runner_up = Candidates::default();
        retriever
            .fallback_search(
                &generation,
                "alpha",
                Category::LandTax,
                &[Category::Duties],
                &[1.0, 0.0, 0.0],
                &mut with_runner_up,
            )
            .await
            .unwrap();
        assert!(with_runner_up.seen.contains(&beta));
    }
}
