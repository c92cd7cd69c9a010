//! TaxLex Ingestion
//!
//! Loads statute documents into passages and builds persisted index
//! generations from them.

pub mod corpus;
pub mod errors;
pub mod sections;

pub use corpus::{open_corpus, JsonCorpus, MarkdownCorpus};
pub use errors::IngestionError;
pub use sections::{SectionSplitter, StatuteSection};
