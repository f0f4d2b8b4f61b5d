//! In-memory vector index over paper chunks.
//!
//! Papers are split into word windows, each window is embedded, and queries
//! are answered by brute-force cosine similarity over all chunks. That is
//! plenty for the tens-to-hundreds of papers a research space pulls in.
//!
//! The index serializes to a single `index.json` file; the cache layer decides
//! where that file lives.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::models::{Chunk, EmbeddingConfig, Paper, ScoredChunk};

/// File name of the serialized index inside a cache entry.
pub const INDEX_FILE: &str = "index.json";

/// Errors that can occur while building, querying or persisting an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Vectors came back with the wrong shape
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid query or build parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reading or writing the index file failed
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The index file could not be (de)serialized
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Split `text` into windows of at most `chunk_size` whitespace-separated words.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    words.chunks(chunk_size).map(|window| window.join(" ")).collect()
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 when the lengths differ or either vector has zero magnitude,
/// so a malformed vector ranks last instead of aborting a query.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Searchable collection of embedded chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    /// Embedding model the chunk vectors came from
    embedding: EmbeddingConfig,

    /// Number of papers the index was built from
    document_count: usize,

    chunks: Vec<Chunk>,
}

impl VectorIndex {
    /// Chunk and embed `papers`.
    ///
    /// # Arguments
    /// * `papers` - Documents to index, in document-set order
    /// * `embedder` - Embedding backend
    /// * `chunk_size` - Words per chunk
    /// * `batch_size` - Chunks per embedding request
    ///
    /// # Errors
    /// Returns `IndexError::EmbeddingError` if any batch fails; no partial
    /// index is returned.
    pub async fn from_documents<E>(
        papers: &[Paper],
        embedder: &E,
        chunk_size: usize,
        batch_size: usize,
    ) -> IndexResult<Self>
    where
        E: EmbeddingProvider + ?Sized,
    {
        if chunk_size == 0 || batch_size == 0 {
            return Err(IndexError::InvalidInput(
                "chunk_size and batch_size must be positive".to_string(),
            ));
        }

        let mut pending: Vec<(usize, usize, String)> = Vec::new();
        for (paper_index, paper) in papers.iter().enumerate() {
            for (chunk_index, text) in chunk_text(&paper.text, chunk_size).into_iter().enumerate() {
                pending.push((paper_index, chunk_index, text));
            }
        }

        debug!(
            "Embedding {} chunks from {} papers in batches of {}",
            pending.len(),
            papers.len(),
            batch_size
        );

        let expected = embedder.dimension();
        let mut chunks = Vec::with_capacity(pending.len());

        for batch in pending.chunks(batch_size) {
            let normalized: Vec<String> = batch.iter().map(|(_, _, text)| normalize_text(text)).collect();
            let refs: Vec<&str> = normalized.iter().map(|s| s.as_str()).collect();

            let embeddings = embedder
                .embed_batch(&refs)
                .await
                .map_err(|e| IndexError::EmbeddingError(e.to_string()))?;

            if embeddings.len() != batch.len() {
                return Err(IndexError::EmbeddingError(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }

            for ((paper_index, chunk_index, text), embedding) in batch.iter().zip(embeddings) {
                if embedding.len() != expected {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                chunks.push(Chunk {
                    paper_index: *paper_index,
                    chunk_index: *chunk_index,
                    title: papers[*paper_index].title.clone(),
                    text: text.clone(),
                    embedding,
                });
            }
        }

        Ok(Self {
            embedding: embedder.config(),
            document_count: papers.len(),
            chunks,
        })
    }

    /// Embed `query` and return the `top_k` most similar chunks, best first.
    pub async fn retrieve<E>(&self, query: &str, embedder: &E, top_k: usize) -> IndexResult<Vec<ScoredChunk>>
    where
        E: EmbeddingProvider + ?Sized,
    {
        let normalized_query = normalize_text(query);
        if normalized_query.is_empty() {
            return Err(IndexError::InvalidInput("Query cannot be empty".to_string()));
        }
        if self.chunks.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = embedder
            .embed(&normalized_query)
            .await
            .map_err(|e| IndexError::EmbeddingError(e.to_string()))?;

        Ok(self.search_by_embedding(&query_embedding, top_k))
    }

    /// Rank chunks against an already-computed query embedding.
    pub fn search_by_embedding(&self, query_embedding: &[f32], top_k: usize) -> Vec<ScoredChunk> {
        let mut results: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk::new(chunk.clone(), cosine_similarity(query_embedding, &chunk.embedding)))
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }

    /// Write the index to `dir/index.json`.
    pub fn persist(&self, dir: &Path) -> IndexResult<()> {
        let data = serde_json::to_vec(self)?;
        fs::write(dir.join(INDEX_FILE), data)?;
        Ok(())
    }

    /// Read an index previously written by [`VectorIndex::persist`].
    pub fn load(dir: &Path) -> IndexResult<Self> {
        let data = fs::read(dir.join(INDEX_FILE))?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn embedding_config(&self) -> &EmbeddingConfig {
        &self.embedding
    }

    pub fn document_count(&self) -> usize {
        self.document_count
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingResult};
    use crate::models::Author;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Keyword embedder: one dimension per vocabulary word, counting occurrences.
    #[derive(Clone)]
    pub(crate) struct KeywordEmbedder {
        vocabulary: Vec<&'static str>,
        batch_calls: Arc<Mutex<Vec<usize>>>,
        fail: bool,
    }

    impl KeywordEmbedder {
        pub(crate) fn new(vocabulary: Vec<&'static str>) -> Self {
            Self {
                vocabulary,
                batch_calls: Arc::new(Mutex::new(Vec::new())),
                fail: false,
            }
        }

        pub(crate) fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        pub(crate) fn batch_sizes(&self) -> Vec<usize> {
            self.batch_calls.lock().unwrap().clone()
        }

        fn vector(&self, text: &str) -> Vec<f32> {
            let mut v: Vec<f32> = self
                .vocabulary
                .iter()
                .map(|word| text.split_whitespace().filter(|w| w == word).count() as f32)
                .collect();
            // Bias term keeps every vector non-zero
            v.push(0.1);
            v
        }
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            if self.fail {
                return Err(EmbeddingError::ApiError("mock failure".to_string()));
            }
            Ok(self.vector(text))
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            self.batch_calls.lock().unwrap().push(texts.len());
            if self.fail {
                return Err(EmbeddingError::ApiError("mock failure".to_string()));
            }
            Ok(texts.iter().map(|t| self.vector(t)).collect())
        }

        fn dimension(&self) -> usize {
            self.vocabulary.len() + 1
        }

        fn model_name(&self) -> &str {
            "keyword-mock"
        }
    }

    pub(crate) fn test_paper(id: &str, title: &str, text: &str) -> Paper {
        Paper {
            paper_id: id.to_string(),
            title: title.to_string(),
            authors: vec![Author {
                name: "Test Author".to_string(),
                author_id: None,
            }],
            abstract_text: text.to_string(),
            publish_year: Some(2021),
            venue: None,
            url: None,
            citation_count: None,
            open_access_pdf: None,
            text: text.to_string(),
        }
    }

    fn corpus() -> Vec<Paper> {
        vec![
            test_paper("1", "Graphs", "graph neural networks aggregate neighbour features on a graph"),
            test_paper("2", "Proteins", "protein folding predicts protein structure"),
            test_paper("3", "Vision", "convolutional networks classify images"),
        ]
    }

    fn embedder() -> KeywordEmbedder {
        KeywordEmbedder::new(vec!["graph", "protein", "images", "networks"])
    }

    #[test]
    fn test_chunk_text_windows() {
        assert_eq!(chunk_text("a b c d e", 2), vec!["a b", "c d", "e"]);
        assert_eq!(chunk_text("  spaced\n\nout  ", 10), vec!["spaced out"]);
        assert!(chunk_text("   ", 5).is_empty());
        assert!(chunk_text("a b", 0).is_empty());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_from_documents_batches_embeddings() {
        let embedder = embedder();
        let papers = corpus();

        // 3-word chunks: 3 + 2 + 2 = 7
        let index = VectorIndex::from_documents(&papers, &embedder, 3, 3).await.unwrap();

        assert_eq!(index.len(), 7);
        assert_eq!(index.document_count(), 3);
        assert_eq!(embedder.batch_sizes(), vec![3, 3, 1]);
        assert_eq!(index.embedding_config().model_name, "keyword-mock");
        assert_eq!(index.chunks()[0].title, "Graphs");
    }

    #[tokio::test]
    async fn test_retrieve_ranks_best_match_first() {
        let embedder = embedder();
        let index = VectorIndex::from_documents(&corpus(), &embedder, 50, 10).await.unwrap();

        let results = index.retrieve("Protein structure", &embedder, 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.title, "Proteins");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_retrieve_empty_query_rejected() {
        let embedder = embedder();
        let index = VectorIndex::from_documents(&corpus(), &embedder, 50, 10).await.unwrap();
        let result = index.retrieve("  ", &embedder, 2).await;
        assert!(matches!(result, Err(IndexError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let embedder = embedder().failing();
        let result = VectorIndex::from_documents(&corpus(), &embedder, 50, 10).await;
        assert!(matches!(result, Err(IndexError::EmbeddingError(_))));
    }

    #[tokio::test]
    async fn test_empty_document_set_builds_empty_index() {
        let embedder = embedder();
        let index = VectorIndex::from_documents(&[], &embedder, 50, 10).await.unwrap();
        assert!(index.is_empty());
        assert!(embedder.batch_sizes().is_empty());
        assert!(index.retrieve("graph", &embedder, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = embedder();
        let index = VectorIndex::from_documents(&corpus(), &embedder, 4, 10).await.unwrap();

        index.persist(dir.path()).unwrap();
        let loaded = VectorIndex::load(dir.path()).unwrap();

        assert_eq!(loaded, index);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(VectorIndex::load(dir.path()), Err(IndexError::IoError(_))));
    }
}
