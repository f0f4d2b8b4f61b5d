//! Runtime-selected embedding backend.
//!
//! The binaries pick a backend from a command-line flag, while the builder and
//! engines are generic over [`EmbeddingProvider`]. This enum bridges the two
//! without boxing.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use super::fastembed::{parse_model_name, FastEmbedProvider};
use super::openai::OpenAIEmbedding;
use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// Wrapper enum for embedding providers to allow dynamic dispatch
pub enum DynamicEmbeddingProvider {
    FastEmbed(FastEmbedProvider),
    OpenAI(OpenAIEmbedding),
}

impl DynamicEmbeddingProvider {
    /// OpenAI embeddings with the key from `OPENAI_API_KEY`.
    pub fn openai(api_key: Option<String>, model: Option<String>) -> EmbeddingResult<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => std::env::var("OPENAI_API_KEY").map_err(|_| {
                EmbeddingError::ConfigError(
                    "OPENAI_API_KEY environment variable must be set when using OpenAI embeddings".to_string(),
                )
            })?,
        };

        let provider = OpenAIEmbedding::new(api_key, model);
        info!(
            "OpenAI provider initialized: model={}, dimension={}",
            provider.model_name(),
            provider.dimension()
        );
        Ok(Self::OpenAI(provider))
    }

    /// Local FastEmbed model; model files are cached under `cache_dir` or `<user cache>/fastembed`.
    pub fn fastembed(model: Option<&str>, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model = match model {
            Some(name) => Some(
                parse_model_name(name)
                    .ok_or_else(|| EmbeddingError::ConfigError(format!("Unknown FastEmbed model: {}", name)))?,
            ),
            None => None,
        };

        let cache_dir = cache_dir.unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|p| p.join("fastembed"))
                .unwrap_or_else(|| PathBuf::from(".cache/fastembed"))
        });
        debug!("Using FastEmbed cache directory: {}", cache_dir.display());

        let provider = FastEmbedProvider::new(model, Some(cache_dir))?;
        info!(
            "FastEmbed provider initialized: model={}, dimension={}",
            provider.model_name(),
            provider.dimension()
        );
        Ok(Self::FastEmbed(provider))
    }
}

#[async_trait]
impl EmbeddingProvider for DynamicEmbeddingProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed(text).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed_batch(texts).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed_batch(texts).await,
        }
    }

    fn dimension(&self) -> usize {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.dimension(),
            DynamicEmbeddingProvider::OpenAI(p) => p.dimension(),
        }
    }

    fn model_name(&self) -> &str {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.model_name(),
            DynamicEmbeddingProvider::OpenAI(p) => p.model_name(),
        }
    }
}
