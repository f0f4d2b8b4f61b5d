//! FastEmbed embedding provider implementation.
//!
//! Runs ONNX embedding models locally through the fastembed library, so an
//! index can be built without an embeddings API key. Indexes built this way
//! record the FastEmbed model name and are rejected if later reloaded with the
//! OpenAI backend.

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// FastEmbed embedding provider.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model instance (wrapped in Arc<Mutex> for thread-safety)
    model: Arc<Mutex<TextEmbedding>>,

    model_name: String,

    embedding_dimension: usize,
}

/// Map a user-facing model name to a FastEmbed model.
///
/// Accepts the enum spelling (`BGESmallENV15`) case-insensitively, with or
/// without dashes and underscores. Returns `None` for unknown names.
pub fn parse_model_name(name: &str) -> Option<EmbeddingModel> {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();

    match key.as_str() {
        "allminilml6v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "bgesmallenv15" => Some(EmbeddingModel::BGESmallENV15),
        "bgebaseenv15" => Some(EmbeddingModel::BGEBaseENV15),
        "bgelargeenv15" => Some(EmbeddingModel::BGELargeENV15),
        "nomicembedtextv1" => Some(EmbeddingModel::NomicEmbedTextV1),
        "nomicembedtextv15" => Some(EmbeddingModel::NomicEmbedTextV15),
        _ => None,
    }
}

fn model_dimension(model: &EmbeddingModel) -> usize {
    match model {
        EmbeddingModel::AllMiniLML6V2 => 384,
        EmbeddingModel::BGESmallENV15 => 384,
        EmbeddingModel::BGEBaseENV15 => 768,
        EmbeddingModel::BGELargeENV15 => 1024,
        EmbeddingModel::NomicEmbedTextV1 => 768,
        EmbeddingModel::NomicEmbedTextV15 => 768,
        _ => 384,
    }
}

impl FastEmbedProvider {
    /// Create a new FastEmbed embedding provider.
    ///
    /// # Arguments
    /// * `model` - Optional model to use (defaults to AllMiniLML6V2)
    /// * `cache_dir` - Optional cache directory for model files
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if the model cannot be loaded
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model_type = model.unwrap_or(EmbeddingModel::AllMiniLML6V2);
        let model_name = format!("{:?}", model_type);
        let embedding_dimension = model_dimension(&model_type);

        let mut init_options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(dir);
        }

        let text_embedding = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e)))?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            embedding_dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        for text in texts {
            if text.trim().is_empty() {
                return Err(EmbeddingError::InvalidInput("All texts must be non-empty".to_string()));
            }
        }

        let mut model = self.model.lock().await;
        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        model
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::Other(format!("Batch embedding generation failed: {}", e)))
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// TextEmbedding does not implement Debug
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}
