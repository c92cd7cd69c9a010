//! TaxLex Common Library
//!
//! Shared code for the TaxLex retrieval crates including:
//! - Passage model and revenue category table
//! - Embedding client abstraction
//! - Error types and handling
//! - Configuration management
//! - Legal text tokenization
//! - Metrics and tracing setup

pub mod category;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod passage;
pub mod telemetry;
pub mod text;

// Re-export commonly used types
pub use category::Category;
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result, RetrievalStage};
pub use passage::{Passage, PassageSource};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
