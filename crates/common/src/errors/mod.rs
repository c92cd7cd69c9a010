//! Error types for TaxLex
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for indexing and query-time failures
//! - The retrieval stage that failed, for whole-query retry decisions
//! - Error codes for machine handling

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Index errors (4xxx)
    IndexUnavailable,
    DimensionMismatch,
    ArtifactError,

    // Retrieval errors (5xxx)
    RetrievalError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    EmbeddingTimeout,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            // Index (4xxx)
            ErrorCode::IndexUnavailable => 4001,
            ErrorCode::DimensionMismatch => 4002,
            ErrorCode::ArtifactError => 4003,

            // Retrieval (5xxx)
            ErrorCode::RetrievalError => 5001,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::EmbeddingTimeout => 8003,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Stage of the hybrid retrieval pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStage {
    Classify,
    PrimarySearch,
    EvaluateSufficiency,
    FallbackSearch,
    Fuse,
    Rerank,
    Deduplicate,
    AssembleContext,
}

impl RetrievalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStage::Classify => "classify",
            RetrievalStage::PrimarySearch => "primary_search",
            RetrievalStage::EvaluateSufficiency => "evaluate_sufficiency",
            RetrievalStage::FallbackSearch => "fallback_search",
            RetrievalStage::Fuse => "fuse",
            RetrievalStage::Rerank => "rerank",
            RetrievalStage::Deduplicate => "deduplicate",
            RetrievalStage::AssembleContext => "assemble_context",
        }
    }
}

impl fmt::Display for RetrievalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Index errors
    #[error("Index unavailable: {message}")]
    IndexUnavailable { message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index artifact error at {path}: {message}")]
    Artifact { path: String, message: String },

    // Query-time failures, tagged with the stage that failed
    #[error("Retrieval failed during {stage}: {source}")]
    Retrieval {
        stage: RetrievalStage,
        #[source]
        source: Box<AppError>,
    },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Wrap an error with the retrieval stage it occurred in
    pub fn at_stage(self, stage: RetrievalStage) -> Self {
        match self {
            // Keep the innermost stage
            AppError::Retrieval { .. } => self,
            other => AppError::Retrieval {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::IndexUnavailable { .. } => ErrorCode::IndexUnavailable,
            AppError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            AppError::Artifact { .. } => ErrorCode::ArtifactError,
            AppError::Retrieval { .. } => ErrorCode::RetrievalError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// The failed stage, for query-time errors
    pub fn stage(&self) -> Option<RetrievalStage> {
        match self {
            AppError::Retrieval { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether retrying the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::EmbeddingError { .. }
            | AppError::EmbeddingTimeout { .. }
            | AppError::HttpClient(_) => true,
            AppError::Retrieval { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Index missing or corrupt; recoverable only by a rebuild
    pub fn needs_rebuild(&self) -> bool {
        match self {
            AppError::IndexUnavailable { .. } | AppError::Artifact { .. } => true,
            AppError::Retrieval { source, .. } => source.needs_rebuild(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AppError::IndexUnavailable {
            message: "no generation published".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::IndexUnavailable);
        assert_eq!(err.code().as_code(), 4001);
    }

    #[test]
    fn test_stage_wrapping_keeps_innermost() {
        let err = AppError::EmbeddingTimeout { timeout_ms: 500 }
            .at_stage(RetrievalStage::FallbackSearch)
            .at_stage(RetrievalStage::AssembleContext);

        assert_eq!(err.stage(), Some(RetrievalStage::FallbackSearch));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("fallback_search"));
    }

    #[test]
    fn test_index_errors_are_not_retryable() {
        let err = AppError::IndexUnavailable {
            message: "artifact skew".to_string(),
        }
        .at_stage(RetrievalStage::PrimarySearch);

        assert!(!err.is_retryable());
        assert!(err.needs_rebuild());
    }
}
