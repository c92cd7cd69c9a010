//! Index generations
//!
//! A generation is one passage snapshot together with the lexical and semantic
//! indexes built from it. Generations are immutable; readers hold an `Arc` to
//! the one that was current when their query started, and a rebuild publishes
//! a whole new generation in a single swap.

mod builder;
mod persistence;

pub use builder::{corpus_fingerprint, IndexBuilder};
pub use persistence::IndexPersistence;

use crate::retrieval::{LexicalIndex, SemanticIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use taxlex_common::errors::{AppError, Result};
use taxlex_common::{Category, Passage};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Build record persisted next to the index artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub generation_id: Uuid,
    pub document_count: usize,
    pub embedding_dimension: usize,
    pub embedding_model: String,

    /// SHA-256 over the passage set, hex encoded
    pub corpus_fingerprint: String,

    pub built_at: DateTime<Utc>,

    /// Embedding batches replaced by zero vectors
    pub failed_batches: usize,
}

/// Passages plus both indexes, built from the same snapshot
#[derive(Debug)]
pub struct IndexGeneration {
    metadata: IndexMetadata,
    passages: Vec<Passage>,
    lexical: LexicalIndex,
    semantic: SemanticIndex,
}

impl IndexGeneration {
    /// Assemble a generation, checking that both indexes cover exactly the passages
    pub fn new(
        metadata: IndexMetadata,
        passages: Vec<Passage>,
        lexical: LexicalIndex,
        semantic: SemanticIndex,
    ) -> Result<Self> {
        let mut ids = HashSet::with_capacity(passages.len());
        if let Some(duplicate) = passages.iter().find(|p| !ids.insert(p.id.as_str())) {
            return Err(AppError::Validation {
                message: format!("duplicate passage id {}", duplicate.id),
                field: Some("id".to_string()),
            });
        }

        lexical.validate(passages.len())?;
        semantic.validate(passages.len())?;

        if metadata.document_count != passages.len() {
            return Err(AppError::IndexUnavailable {
                message: format!(
                    "metadata records {} passages, generation has {}",
                    metadata.document_count,
                    passages.len()
                ),
            });
        }
        if metadata.embedding_dimension != semantic.dimension() {
            return Err(AppError::DimensionMismatch {
                expected: metadata.embedding_dimension,
                actual: semantic.dimension(),
            });
        }

        Ok(Self {
            metadata,
            passages,
            lexical,
            semantic,
        })
    }

    pub fn id(&self) -> Uuid {
        self.metadata.generation_id
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn semantic(&self) -> &SemanticIndex {
        &self.semantic
    }

    pub fn passage(&self, id: &str) -> Option<&Passage> {
        self.passages.iter().find(|p| p.id == id)
    }

    /// Corpus summary for operators
    pub fn statistics(&self) -> IndexStatistics {
        let mut passages_per_category = BTreeMap::new();
        let mut acts = BTreeSet::new();
        for passage in &self.passages {
            *passages_per_category.entry(passage.category).or_insert(0) += 1;
            acts.insert(passage.act_name.clone());
        }

        IndexStatistics {
            generation_id: self.id(),
            total_passages: self.passages.len(),
            distinct_acts: acts.len(),
            acts: acts.into_iter().collect(),
            passages_per_category,
            vocabulary_size: self.lexical.term_count(),
            embedding_dimension: self.semantic.dimension(),
            embedding_model: self.semantic.model().to_string(),
            zero_vectors: self.semantic.zero_vector_count(),
            built_at: self.metadata.built_at,
        }
    }
}

/// Summary of a generation's contents
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatistics {
    pub generation_id: Uuid,
    pub total_passages: usize,
    pub distinct_acts: usize,
    pub acts: Vec<String>,
    pub passages_per_category: BTreeMap<Category, usize>,
    pub vocabulary_size: usize,
    pub embedding_dimension: usize,
    pub embedding_model: String,
    pub zero_vectors: usize,
    pub built_at: DateTime<Utc>,
}

/// Holder of the published generation
#[derive(Debug, Default)]
pub struct IndexStore {
    current: RwLock<Option<Arc<IndexGeneration>>>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current generation; in-flight queries keep the one they hold
    pub async fn publish(&self, generation: IndexGeneration) -> Arc<IndexGeneration> {
        let generation = Arc::new(generation);
        let previous = self.current.write().await.replace(generation.clone());

        info!(
            generation = %generation.id(),
            previous = ?previous.map(|g| g.id()),
            passages = generation.passages().len(),
            "Index generation published"
        );
        generation
    }

    /// The current generation
    pub async fn snapshot(&self) -> Result<Arc<IndexGeneration>> {
        self.current
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::IndexUnavailable {
                message: "no index generation has been published".to_string(),
            })
    }

    pub async fn is_ready(&self) -> bool {
        self.current.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture_passages;
    use taxlex_common::config::IndexConfig;
    use taxlex_common::embeddings::HashingEmbedder;

    async fn build() -> IndexGeneration {
        IndexBuilder::new(Arc::new(HashingEmbedder::new(64)), &IndexConfig::default(), 3)
            .build(fixture_passages())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_is_unavailable() {
        let store = IndexStore::new();
        assert!(!store.is_ready().await);
        assert!(matches!(
            store.snapshot().await,
            Err(AppError::IndexUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_swaps_whole_generation() {
        let store = IndexStore::new();
        let first = store.publish(build().await).await;
        let held = store.snapshot().await.unwrap();

        let second = store.publish(build().await).await;
        assert_ne!(first.id(), second.id());

        // A reader that took its snapshot earlier still sees the old generation
        assert_eq!(held.id(), first.id());
        assert_eq!(store.snapshot().await.unwrap().id(), second.id());
    }

    #[tokio::test]
    async fn test_statistics() {
        let generation = build().await;
        let stats = generation.statistics();

        assert_eq!(stats.total_passages, 8);
        assert_eq!(stats.passages_per_category[&Category::PayrollTax], 3);
        assert_eq!(stats.distinct_acts, 6);
        assert_eq!(stats.embedding_dimension, 64);
        assert_eq!(stats.zero_vectors, 0);
        assert!(stats.vocabulary_size > 0);
    }

    #[tokio::test]
    async fn test_rejects_mismatched_parts() {
        let generation = build().await;
        let mut passages = generation.passages().to_vec();
        passages.pop();

        let err = IndexGeneration::new(
            IndexMetadata {
                document_count: passages.len(),
                ..generation.metadata().clone()
            },
            passages,
            generation.lexical().clone(),
            generation.semantic().clone(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::IndexUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_passage_lookup() {
        let generation = build().await;
        assert_eq!(generation.passage("d-31").unwrap().act_name, "Duties Act 1997");
        assert!(generation.passage("missing").is_none());
    }
}
