//! Ingestion error types

use taxlex_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Corpus not found: {0}")]
    CorpusNotFound(String),

    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error for {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Section splitting error: {0}")]
    SplittingError(String),

    #[error(transparent)]
    Index(#[from] AppError),
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::Index(inner) => inner,
            IngestionError::CorpusNotFound(path) => AppError::Configuration {
                message: format!("corpus not found: {}", path),
            },
            IngestionError::ParseError { path, message } => AppError::InvalidFormat {
                message: format!("{}: {}", path, message),
            },
            other => AppError::Internal {
                message: other.to_string(),
            },
        }
    }
}
