//! Text embedding backends.
//!
//! The index builder and both chat engines only see [`EmbeddingProvider`], so
//! the hosted OpenAI model, a local FastEmbed model and test fakes are
//! interchangeable. The model identity is persisted next to each index.

pub mod dynamic;
pub mod fastembed;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::EmbeddingConfig;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Missing key, unknown model name and similar setup problems
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unexpected error: {0}")]
    Other(String),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Turns paper chunks and user queries into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Output order matches `texts`.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;

    /// Identity stored in `embedding.json` and checked when an index is reloaded.
    fn config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: self.model_name().to_string(),
            dimension: self.dimension(),
        }
    }
}

#[async_trait]
impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for std::sync::Arc<T> {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Lowercases and collapses runs of whitespace into single spaces.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}
