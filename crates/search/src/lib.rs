//! TaxLex Search
//!
//! Retrieval core for statute question answering:
//! - Query classification into revenue categories
//! - BM25 and dense indexes built and published as one generation
//! - Hybrid retrieval with RRF fusion, domain reranking and context assembly
//! - Citation extraction and validation against known acts
//! - Cross-references between revenue areas and tax estimates from rate schedules

pub mod calculation;
pub mod citation;
pub mod classifier;
pub mod index;
pub mod retrieval;

#[cfg(test)]
mod test_support;

pub use calculation::{TaxCalculation, TaxCalculator};
pub use citation::relationships::{CrossReference, RelationshipGraph, ScenarioContext};
pub use citation::{Citation, CitationExtractor};
pub use classifier::{ClassificationResult, QueryClassifier};
pub use index::{IndexBuilder, IndexGeneration, IndexPersistence, IndexStore};
pub use retrieval::{Evidence, HybridRetriever, RetrievalContext};
