//! Semantic index: unit vectors with exhaustive inner-product search
//!
//! The corpus is a few thousand passages, so a flat scan is exact and fast
//! enough. Passages whose embedding batch failed hold zero vectors and are
//! never returned.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use taxlex_common::embeddings::{normalize, Embedder};
use taxlex_common::errors::{AppError, Result};
use taxlex_common::metrics::record_embedding;
use taxlex_common::Passage;
use tracing::{debug, instrument, warn};

/// Dense vector per passage, in passage order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticIndex {
    dimension: usize,
    model: String,
    vectors: Vec<Vec<f32>>,
}

/// Outcome of a semantic build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddingReport {
    pub batches: usize,
    pub failed_batches: usize,
}

fn is_zero(vector: &[f32]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}

impl SemanticIndex {
    /// Embed every passage in fixed-size batches.
    ///
    /// A failed or malformed batch is replaced by zero vectors and counted in the
    /// report; the build itself never fails because of the embedding service.
    #[instrument(skip(passages, embedder), fields(passages = passages.len(), model = embedder.model_name()))]
    pub async fn build(
        passages: &[Passage],
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> (Self, EmbeddingReport) {
        let dimension = embedder.dimension();
        let batch_size = batch_size.max(1);
        let mut vectors = Vec::with_capacity(passages.len());
        let mut report = EmbeddingReport::default();

        for (batch_index, batch) in passages.chunks(batch_size).enumerate() {
            report.batches += 1;
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            let start = Instant::now();

            let embedded = match embedder.embed_batch(&texts).await {
                Ok(embeddings) if embeddings.len() != batch.len() => Err(AppError::EmbeddingError {
                    message: format!(
                        "expected {} embeddings, received {}",
                        batch.len(),
                        embeddings.len()
                    ),
                }),
                Ok(embeddings) => match embeddings.iter().find(|e| e.len() != dimension) {
                    Some(bad) => Err(AppError::DimensionMismatch {
                        expected: dimension,
                        actual: bad.len(),
                    }),
                    None => Ok(embeddings),
                },
                Err(e) => Err(e),
            };

            record_embedding(
                start.elapsed().as_secs_f64(),
                embedder.model_name(),
                batch.len(),
                embedded.is_ok(),
            );

            match embedded {
                Ok(embeddings) => {
                    for mut vector in embeddings {
                        normalize(&mut vector);
                        vectors.push(vector);
                    }
                }
                Err(e) => {
                    warn!(
                        batch = batch_index,
                        size = batch.len(),
                        first_passage = %batch[0].id,
                        error = %e,
                        "Embedding batch failed, substituting zero vectors"
                    );
                    report.failed_batches += 1;
                    vectors.extend(std::iter::repeat(vec![0.0; dimension]).take(batch.len()));
                }
            }
        }

        debug!(
            vectors = vectors.len(),
            failed_batches = report.failed_batches,
            "Semantic index built"
        );

        (
            Self {
                dimension,
                model: embedder.model_name().to_string(),
                vectors,
            },
            report,
        )
    }

    /// Reassemble an index from persisted vectors
    pub fn from_parts(dimension: usize, model: String, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(AppError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        Ok(Self {
            dimension,
            model,
            vectors,
        })
    }

    pub fn into_parts(self) -> (usize, String, Vec<Vec<f32>>) {
        (self.dimension, self.model, self.vectors)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    /// Passages left without an embedding
    pub fn zero_vector_count(&self) -> usize {
        self.vectors.iter().filter(|v| is_zero(v)).count()
    }

    /// Check dimensionality and unit-normalise a query embedding
    pub fn prepare_query(&self, mut query: Vec<f32>) -> Result<Vec<f32>> {
        if query.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        normalize(&mut query);
        Ok(query)
    }

    /// Cosine similarity between a prepared query and one passage
    pub fn similarity(&self, doc: usize, query: &[f32]) -> f32 {
        self.vectors
            .get(doc)
            .map(|v| v.iter().zip(query).map(|(a, b)| a * b).sum())
            .unwrap_or(0.0)
    }

    /// Top-k passages with similarity at least `min_similarity`, restricted by `allow`.
    /// `query` must come from [`SemanticIndex::prepare_query`].
    pub fn search<F>(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: f32,
        allow: F,
    ) -> Vec<(usize, f32)>
    where
        F: Fn(usize) -> bool,
    {
        if k == 0 || is_zero(query) {
            return Vec::new();
        }

        let mut results: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(doc, vector)| allow(*doc) && !is_zero(vector))
            .map(|(doc, vector)| (doc, vector.iter().zip(query).map(|(a, b)| a * b).sum::<f32>()))
            .filter(|(_, similarity)| *similarity >= min_similarity)
            .collect();

        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        results.truncate(k);
        results
    }

    /// Check coverage of the generation's passages
    pub fn validate(&self, passage_count: usize) -> Result<()> {
        if self.vectors.len() != passage_count {
            return Err(AppError::IndexUnavailable {
                message: format!(
                    "semantic index covers {} passages, generation has {}",
                    self.vectors.len(),
                    passage_count
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use taxlex_common::embeddings::HashingEmbedder;
    use taxlex_common::Category;

    fn passages(texts: &[&str]) -> Vec<Passage> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Passage::new(i.to_string(), *t, "Test Act 2000", None, Category::General).unwrap())
            .collect()
    }

    /// Fails every second batch
    struct FlakyEmbedder {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                return Err(AppError::EmbeddingTimeout { timeout_ms: 10 });
            }
            self.inner.embed_batch(texts).await
        }

        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    #[tokio::test]
    async fn test_search_returns_most_similar_first() {
        let embedder = HashingEmbedder::new(256);
        let corpus = passages(&[
            "payroll tax wages employer",
            "land tax unimproved value",
            "transfer duty conveyance",
        ]);
        let (index, report) = SemanticIndex::build(&corpus, &embedder, 2).await;
        assert_eq!(report.batches, 2);
        assert_eq!(report.failed_batches, 0);

        let query = index
            .prepare_query(embedder.embed("land tax value").await.unwrap())
            .unwrap();
        let results = index.search(&query, 3, 0.0, |_| true);
        assert_eq!(results[0].0, 1);
        assert!(results.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[tokio::test]
    async fn test_failed_batches_become_zero_vectors() {
        let embedder = FlakyEmbedder {
            inner: HashingEmbedder::new(64),
            calls: AtomicUsize::new(0),
        };
        let corpus = passages(&["payroll wages", "payroll employer", "payroll threshold", "payroll rate"]);
        let (index, report) = SemanticIndex::build(&corpus, &embedder, 2).await;

        assert_eq!(index.len(), 4);
        assert_eq!(report.failed_batches, 1);
        assert_eq!(index.zero_vector_count(), 2);

        // Zero-vector passages never surface, even with no similarity floor
        let query = index
            .prepare_query(embedder.embed("payroll").await.unwrap())
            .unwrap();
        let results = index.search(&query, 10, -1.0, |_| true);
        assert!(results.iter().all(|(doc, _)| *doc < 2));
    }

    #[tokio::test]
    async fn test_threshold_and_filter() {
        let embedder = HashingEmbedder::new(128);
        let corpus = passages(&["payroll tax", "payroll tax", "fines enforcement"]);
        let (index, _) = SemanticIndex::build(&corpus, &embedder, 16).await;
        let query = index.prepare_query(embedder.embed("payroll tax").await.unwrap()).unwrap();

        let results = index.search(&query, 10, 0.99, |doc| doc != 0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn test_prepare_query_rejects_wrong_dimension() {
        let index = SemanticIndex::from_parts(3, "m".to_string(), vec![vec![1.0, 0.0, 0.0]]).unwrap();
        assert!(matches!(
            index.prepare_query(vec![1.0, 0.0]),
            Err(AppError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(SemanticIndex::from_parts(3, "m".to_string(), vec![vec![1.0]]).is_err());
    }
}
