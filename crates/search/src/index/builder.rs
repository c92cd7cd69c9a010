//! Builds a complete index generation from a passage set

use super::{IndexGeneration, IndexMetadata};
use crate::retrieval::{LexicalIndex, SemanticIndex};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use taxlex_common::config::IndexConfig;
use taxlex_common::errors::{AppError, Result};
use taxlex_common::metrics::record_index_build;
use taxlex_common::{Embedder, Passage};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// SHA-256 over every field that affects indexing, hex encoded
pub fn corpus_fingerprint(passages: &[Passage]) -> String {
    let mut hasher = Sha256::new();
    for passage in passages {
        for field in [
            passage.id.as_str(),
            passage.text.as_str(),
            passage.act_name.as_str(),
            passage.section_number.as_deref().unwrap_or(""),
            passage.category.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
    }
    hex::encode(hasher.finalize())
}

/// Index builder
pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    k1: f32,
    b: f32,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, config: &IndexConfig, batch_size: usize) -> Self {
        Self {
            embedder,
            k1: config.bm25_k1,
            b: config.bm25_b,
            batch_size: batch_size.max(1),
        }
    }

    /// Build both indexes concurrently from one passage snapshot.
    ///
    /// Embedding failures degrade affected passages to zero vectors; the build
    /// fails only on invalid input or an internal task failure.
    #[instrument(skip_all, fields(passages = passages.len(), model = self.embedder.model_name()))]
    pub async fn build(&self, passages: Vec<Passage>) -> Result<IndexGeneration> {
        let start = Instant::now();
        if passages.is_empty() {
            warn!("Building an index generation with no passages");
        }

        let fingerprint = corpus_fingerprint(&passages);
        let passages = Arc::new(passages);
        let lexical_passages = passages.clone();
        let (k1, b) = (self.k1, self.b);

        let (lexical, (semantic, report)) = tokio::join!(
            tokio::task::spawn_blocking(move || LexicalIndex::build(&lexical_passages, k1, b)),
            SemanticIndex::build(&passages, self.embedder.as_ref(), self.batch_size),
        );
        let lexical = lexical.map_err(|e| AppError::Internal {
            message: format!("lexical index build task failed: {}", e),
        })?;

        let passages = Arc::try_unwrap(passages).unwrap_or_else(|shared| (*shared).clone());

        let metadata = IndexMetadata {
            generation_id: Uuid::now_v7(),
            document_count: passages.len(),
            embedding_dimension: semantic.dimension(),
            embedding_model: semantic.model().to_string(),
            corpus_fingerprint: fingerprint,
            built_at: Utc::now(),
            failed_batches: report.failed_batches,
        };

        let duration = start.elapsed();
        record_index_build(duration.as_secs_f64(), passages.len(), report.failed_batches);
        info!(
            generation = %metadata.generation_id,
            passages = passages.len(),
            terms = lexical.term_count(),
            batches = report.batches,
            failed_batches = report.failed_batches,
            duration_ms = duration.as_millis() as u64,
            "Index generation built"
        );

        IndexGeneration::new(metadata, passages, lexical, semantic)
    }
}
