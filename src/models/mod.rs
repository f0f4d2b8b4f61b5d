//! Core data models for the paper chat system.
//!
//! This module contains the fundamental data structures used across the application,
//! including paper metadata, indexed chunks, retrieval results and the service
//! configuration shared by the builder and the engines.

use serde::{Deserialize, Serialize};

/// Represents a single author of a paper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Author {
    /// Full name of the author
    pub name: String,

    /// Literature-source identifier for the author, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

/// A paper document returned by a literature source.
///
/// `text` is the body that gets chunked and embedded: title plus abstract by
/// default, or the extracted full text when the source was asked for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// Identifier assigned by the literature source
    pub paper_id: String,

    /// Paper title
    pub title: String,

    /// List of authors
    #[serde(default)]
    pub authors: Vec<Author>,

    /// Abstract text (may be empty when the source has none)
    #[serde(default)]
    pub abstract_text: String,

    /// Year of publication
    #[serde(default)]
    pub publish_year: Option<i32>,

    /// Venue name
    #[serde(default)]
    pub venue: Option<String>,

    /// Landing page URL
    #[serde(default)]
    pub url: Option<String>,

    /// Number of citations reported by the source
    #[serde(default)]
    pub citation_count: Option<u32>,

    /// Open-access PDF location, used for full-text loading
    #[serde(default)]
    pub open_access_pdf: Option<String>,

    /// Text to index
    pub text: String,
}

impl Paper {
    /// Build the default indexable body from title and abstract.
    pub fn summary_text(title: &str, abstract_text: &str) -> String {
        if abstract_text.trim().is_empty() {
            title.to_string()
        } else {
            format!("{}\n\n{}", title, abstract_text)
        }
    }

    /// Short human-readable label used when citing this paper.
    pub fn citation_label(&self) -> String {
        let first_author = self.authors.first().map(|a| a.name.as_str());
        match (first_author, self.publish_year) {
            (Some(author), Some(year)) if self.authors.len() > 1 => {
                format!("{} et al. ({}) {}", author, year, self.title)
            }
            (Some(author), Some(year)) => format!("{} ({}) {}", author, year, self.title),
            (Some(author), None) => format!("{}: {}", author, self.title),
            (None, Some(year)) => format!("({}) {}", year, self.title),
            (None, None) => self.title.clone(),
        }
    }
}

/// An ordered collection of papers, as returned by the literature source.
pub type DocumentSet = Vec<Paper>;

/// A slice of one paper's text together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Position of the source paper in the document set
    pub paper_index: usize,

    /// Position of this chunk within its paper
    pub chunk_index: usize,

    /// Title of the source paper, kept for display without a document lookup
    pub title: String,

    /// Chunk text
    pub text: String,

    /// Vector embedding of the chunk text
    pub embedding: Vec<f32>,
}

/// Relevance classification for retrieved chunks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelevanceLevel {
    /// Extremely high similarity (cosine similarity > 0.95)
    Identical,

    /// Very high similarity (cosine similarity > 0.85)
    HighlySimilar,

    /// Moderate similarity (cosine similarity > 0.70)
    Similar,

    /// Anything lower
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a cosine similarity score.
    pub fn from_score(score: f32) -> Self {
        if score > 0.95 {
            RelevanceLevel::Identical
        } else if score > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if score > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }
}

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,

    /// Cosine similarity score, higher is better
    pub score: f32,

    pub relevance: RelevanceLevel,
}

impl ScoredChunk {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self {
            chunk,
            score,
            relevance: RelevanceLevel::from_score(score),
        }
    }
}

/// Identity of the embedding model an index was built with.
///
/// Stored next to a persisted index so that a reload with a different
/// embedding backend is rejected instead of silently producing garbage scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Name/identifier of the embedding model (e.g., "text-embedding-ada-002")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}

/// Fixed service settings for building indexes and running engines.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Chat model used for answers and question synthesis
    pub llm_model: String,

    /// Sampling temperature for the chat model
    pub temperature: f32,

    /// Embedding model name
    pub embedding_model: String,

    /// Number of texts sent per embedding request
    pub embed_batch_size: usize,

    /// Words per indexed chunk
    pub chunk_size: usize,

    /// Directory under which cache entries are created
    pub cache_root: std::path::PathBuf,

    /// Token budget of the chat memory buffer
    pub memory_token_limit: usize,

    /// Paper limit used by the one-shot fallback when a first build fails
    pub fallback_paper_limit: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            llm_model: crate::DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.0,
            embedding_model: crate::DEFAULT_EMBEDDING_MODEL.to_string(),
            embed_batch_size: 10,
            chunk_size: 512,
            cache_root: std::path::PathBuf::from("."),
            memory_token_limit: 2000,
            fallback_paper_limit: 50,
        }
    }
}
