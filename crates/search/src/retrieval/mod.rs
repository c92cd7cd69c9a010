//! Hybrid statute retrieval
//!
//! Two index kinds over one passage set:
//! - Semantic index (cosine similarity via embeddings)
//! - Lexical index (BM25 over legal-aware tokens)
//!
//! [`HybridRetriever`] runs the query pipeline: classify, primary search,
//! optional fallback, RRF fusion, domain reranking, near-duplicate removal and
//! token-bounded context assembly.

pub mod bm25;
pub mod context;
pub mod fusion;
mod hybrid;
pub mod rerank;
pub mod vector;

pub use bm25::LexicalIndex;
pub use context::{ContextAssembler, AssembledContext};
pub use fusion::RRFusion;
pub use hybrid::HybridRetriever;
pub use rerank::Reranker;
pub use vector::{EmbeddingReport, SemanticIndex};

use serde::Serialize;
use taxlex_common::{Category, Passage};
use uuid::Uuid;

/// One candidate passage during fusion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Position of the passage in the generation
    pub doc: usize,

    pub lexical_score: f32,

    /// Cosine similarity to the query
    pub semantic_score: f32,

    pub fused_score: f32,

    /// Zero-based rank in the lexical ranking, if present
    pub lexical_rank: Option<usize>,

    /// Zero-based rank in the semantic ranking, if present
    pub semantic_rank: Option<usize>,
}

impl SearchHit {
    pub fn new(doc: usize) -> Self {
        Self {
            doc,
            lexical_score: 0.0,
            semantic_score: 0.0,
            fused_score: 0.0,
            lexical_rank: None,
            semantic_rank: None,
        }
    }
}

/// A passage selected for the context, with its scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub passage: Passage,
    pub lexical_score: f32,
    pub semantic_score: f32,
    pub fused_score: f32,

    /// Fused score after rerank adjustments
    pub final_score: f32,
}

/// Whether the context is strong enough to answer from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    Sufficient,
    /// Nothing relevant was found; callers should say so instead of answering
    Insufficient,
}

/// Final output of a retrieval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalContext {
    pub query: String,

    /// Resolved category (general when classification degraded)
    pub category: Category,

    pub classification_confidence: f32,

    /// Classification fell back to general with the default confidence
    pub classification_degraded: bool,

    /// Passages in the assembled context, best first
    pub retrieved_chunks: Vec<RetrievedPassage>,

    pub total_search_time_ms: u64,

    pub context_text: String,

    pub estimated_tokens: usize,

    pub relevance_score: f32,

    pub fallback_used: bool,

    pub evidence: Evidence,

    /// Index generation every lookup in this query read from
    pub generation_id: Uuid,
}

impl RetrievalContext {
    pub fn is_empty(&self) -> bool {
        self.retrieved_chunks.is_empty()
    }

    pub fn passages(&self) -> impl Iterator<Item = &Passage> {
        self.retrieved_chunks.iter().map(|c| &c.passage)
    }
}
