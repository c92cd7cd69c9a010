//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - OpenAI-compatible HTTP endpoints (text-embedding-3-small, ...)
//! - A deterministic feature-hashing embedder for offline builds and tests
//!
//! Retries and timeouts live here, at the service boundary. Callers above this
//! layer never retry an embedding call themselves.

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::text::tokenize;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

#[derive(Serialize)]
struct OpenAIRequest {
    input: Vec<String>,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "embedding.api_key is required for the openai provider".to_string(),
        })?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            timeout,
            max_retries: config.max_retries,
        })
    }

    /// Make request with exponential backoff
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_max_elapsed_time(Some(self.timeout * (self.max_retries + 1)))
            .build();

        let mut attempt = 0u32;
        let max_retries = self.max_retries;

        backoff::future::retry_notify(
            policy,
            || {
                attempt += 1;
                let last_attempt = attempt > max_retries;
                async move {
                    self.make_request(texts).await.map_err(|e| match e {
                        backoff::Error::Transient { err, .. } if last_attempt => {
                            backoff::Error::permanent(err)
                        }
                        other => other,
                    })
                }
            },
            |e: AppError, delay: Duration| {
                tracing::warn!(
                    max_retries = max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Embedding request failed, retrying"
                );
            },
        )
        .await
    }

    async fn make_request(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, backoff::Error<AppError>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
            dimensions: self.model.starts_with("text-embedding-3").then_some(self.dimension),
        };

        let send = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send();

        let response = match tokio::time::timeout(self.timeout, send).await {
            Err(_) => {
                return Err(backoff::Error::transient(AppError::EmbeddingTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }))
            }
            Ok(Err(e)) => {
                return Err(backoff::Error::transient(AppError::EmbeddingError {
                    message: format!("Request failed: {}", e),
                }))
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            };
            // Client errors other than rate limiting will not improve on retry
            return if status.is_client_error() && status.as_u16() != 429 {
                Err(backoff::Error::permanent(err))
            } else {
                Err(backoff::Error::transient(err))
            };
        }

        let result: OpenAIResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            })
        })?;

        let embeddings: Vec<Vec<f32>> = result.data.into_iter().map(|e| e.embedding).collect();
        if embeddings.len() != texts.len() {
            return Err(backoff::Error::permanent(AppError::EmbeddingError {
                message: format!(
                    "Expected {} embeddings, received {}",
                    texts.len(),
                    embeddings.len()
                ),
            }));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(backoff::Error::permanent(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            }));
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // OpenAI has a limit of 2048 texts per request
        const BATCH_SIZE: usize = 100;

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lexical token is hashed into one of `dimension` buckets with a hashed
/// sign; the bag is L2-normalised. Texts sharing vocabulary land close together,
/// which is enough for offline corpora and reproducible tests.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.embed("payroll tax rate for wages").await.unwrap();
        let b = embedder.embed("payroll tax rate for wages").await.unwrap();
        assert_eq!(a.len(), 128);
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_embedder_similarity() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed("payroll tax wages threshold").await.unwrap();
        let close = embedder.embed("payroll tax on wages above the threshold").await.unwrap();
        let far = embedder.embed("weather forecast sunshine").await.unwrap();
        assert!(cosine(&query, &close) > cosine(&query, &far));
    }

    #[tokio::test]
    async fn test_hashing_batch() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["land tax".to_string(), "".to_string()];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert!(embeddings[1].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_create_embedder_requires_key_for_openai() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_embedder(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_create_embedder_rejects_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "carrier-pigeon".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
