//! Index builder.
//!
//! Turns a research-space request into a searchable index plus the document
//! set behind it, reusing a previously built cache entry when one exists.
//!
//! # Usage
//!
//! ```ignore
//! use paper_chat::builder::IndexBuilder;
//! use paper_chat::embedding::openai::OpenAIEmbedding;
//! use paper_chat::provider::semantic_scholar::SemanticScholarProvider;
//! use paper_chat::ServiceConfig;
//!
//! let builder = IndexBuilder::new(
//!     SemanticScholarProvider::new(None)?,
//!     OpenAIEmbedding::new(api_key, None),
//!     ServiceConfig::default(),
//! );
//! let (index, documents) = builder.build_or_load("graph neural networks", 10, false).await?;
//! ```
//!
//! The first call fetches papers and embeds them; later calls with the same
//! (topic, count, full-text) arguments load from disk without touching the
//! literature source.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{cache_key, CacheError, CacheResult, CacheStatus, CacheValue, IndexCache};
use crate::embedding::EmbeddingProvider;
use crate::index::{IndexError, VectorIndex};
use crate::models::{EmbeddingConfig, Paper, ServiceConfig};
use crate::provider::{PaperProvider, ProviderError};

/// File holding the serialized document set inside a cache entry.
pub const DOCUMENTS_FILE: &str = "documents.pkl";

/// File recording the embedding model of a cache entry.
pub const EMBEDDING_FILE: &str = "embedding.json";

/// Errors that can occur while building or loading an index.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Fetching papers failed
    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    /// Chunking or embedding failed
    #[error("Index error: {0}")]
    IndexError(#[from] IndexError),

    /// Reading or writing the cache entry failed
    #[error("Cache error: {0}")]
    CacheError(#[from] CacheError),

    /// A cached index was built with a different embedding model
    #[error("Embedding model mismatch: index uses '{stored}' ({stored_dim}d) but provider is '{active}' ({active_dim}d)")]
    EmbeddingMismatch {
        stored: String,
        stored_dim: usize,
        active: String,
        active_dim: usize,
    },

    /// Invalid request parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for builder operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Index and document set stored together in one cache entry.
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub index: VectorIndex,
    pub documents: Vec<Paper>,
}

impl CacheValue for BuiltIndex {
    fn save(&self, dir: &Path) -> CacheResult<()> {
        self.index
            .persist(dir)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;

        let documents = serde_json::to_vec(&self.documents)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        fs::write(dir.join(DOCUMENTS_FILE), documents)?;

        let embedding = serde_json::to_vec_pretty(self.index.embedding_config())
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        fs::write(dir.join(EMBEDDING_FILE), embedding)?;
        Ok(())
    }

    fn load(dir: &Path) -> CacheResult<Self> {
        let index = VectorIndex::load(dir).map_err(|e| match e {
            IndexError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                CacheError::NotFound(dir.join(crate::index::INDEX_FILE).display().to_string())
            }
            other => CacheError::SerializationError(other.to_string()),
        })?;

        let documents_path = dir.join(DOCUMENTS_FILE);
        let data = match fs::read(&documents_path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::NotFound(documents_path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let documents = serde_json::from_slice(&data)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;

        Ok(Self { index, documents })
    }
}

/// Builds or loads the index for a research space.
pub struct IndexBuilder<P, E>
where
    P: PaperProvider,
    E: EmbeddingProvider,
{
    provider: P,
    embedder: E,
    cache: IndexCache,
    config: ServiceConfig,
}

impl<P, E> IndexBuilder<P, E>
where
    P: PaperProvider,
    E: EmbeddingProvider,
{
    /// Create a builder whose cache lives under `config.cache_root`.
    pub fn new(provider: P, embedder: E, config: ServiceConfig) -> Self {
        let cache = IndexCache::new(config.cache_root.clone());
        Self {
            provider,
            embedder,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Load the cached index for this request, or fetch papers and build it.
    ///
    /// If fetching or indexing fails on a fresh build, the failure is logged
    /// and the build is retried once with the fallback paper limit and
    /// `full_text = false`. A second failure is returned to the caller.
    ///
    /// # Errors
    /// - `BuildError::InvalidInput` if `num_papers` is zero
    /// - `BuildError::CacheError(CacheError::NotFound)` if a complete entry
    ///   lacks its document set
    /// - `BuildError::EmbeddingMismatch` if the cached entry was built with a
    ///   different embedding model than this builder's
    pub async fn build_or_load(
        &self,
        research_space: &str,
        num_papers: usize,
        full_text: bool,
    ) -> BuildResult<(VectorIndex, Vec<Paper>)> {
        if num_papers == 0 {
            return Err(BuildError::InvalidInput("num_papers must be positive".to_string()));
        }

        let key = cache_key(research_space, num_papers, full_text);
        let path = self.cache.entry_path(&key);

        if self.cache.is_complete(&key) {
            info!("Loading index for research space from existing index: {}", path.display());
        }

        let (built, status) = self
            .cache
            .get_or_compute(&key, || async {
                info!(
                    "Creating index for research space: {} with {} papers at: {}",
                    research_space,
                    num_papers,
                    path.display()
                );
                self.build_with_fallback(research_space, num_papers, full_text).await
            })
            .await?;

        match status {
            CacheStatus::Hit => {
                self.check_embedding(built.index.embedding_config())?;
                info!("Done loading index");
            }
            CacheStatus::Built => info!(
                "Persisted index with {} chunks and {} documents to {}",
                built.index.len(),
                built.documents.len(),
                path.display()
            ),
        }

        Ok((built.index, built.documents))
    }

    async fn build_with_fallback(
        &self,
        research_space: &str,
        num_papers: usize,
        full_text: bool,
    ) -> BuildResult<BuiltIndex> {
        match self.fetch_and_index(research_space, num_papers, full_text).await {
            Ok(built) => Ok(built),
            Err(e) => {
                warn!("Error creating index: {}", e);
                self.fetch_and_index(research_space, self.config.fallback_paper_limit, false)
                    .await
            }
        }
    }

    async fn fetch_and_index(&self, research_space: &str, limit: usize, full_text: bool) -> BuildResult<BuiltIndex> {
        let documents = self.provider.load_data(research_space, limit, full_text).await?;
        info!("Fetched {} papers from {}", documents.len(), self.provider.name());

        let index = VectorIndex::from_documents(
            &documents,
            &self.embedder,
            self.config.chunk_size,
            self.config.embed_batch_size,
        )
        .await?;

        Ok(BuiltIndex { index, documents })
    }

    fn check_embedding(&self, stored: &EmbeddingConfig) -> BuildResult<()> {
        let active = self.embedder.config();
        if *stored != active {
            return Err(BuildError::EmbeddingMismatch {
                stored: stored.model_name.clone(),
                stored_dim: stored.dimension,
                active: active.model_name,
                active_dim: active.dimension,
            });
        }
        Ok(())
    }
}
