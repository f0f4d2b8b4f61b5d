//! Paper provider module.
//!
//! This module defines the interface for sourcing papers from a literature
//! search service and includes the Semantic Scholar implementation.
//!
//! The `PaperProvider` trait abstracts the source of paper data, allowing the
//! index builder to work with different backends (and with test doubles)
//! without coupling to a specific API.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Paper;

pub mod semantic_scholar;

/// Errors that can occur when fetching papers from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the data format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// API rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other provider-specific errors
    #[error("Provider error: {0}")]
    Other(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for literature-search sources.
///
/// # Design Notes
///
/// - Providers return papers in the source's relevance order
/// - `limit` is an upper bound; fewer papers may come back
/// - With `full_text`, providers should fill `Paper::text` with the paper body
///   where they can, and keep title + abstract otherwise
#[async_trait]
pub trait PaperProvider: Send + Sync {
    /// Search the source for `topic` and return up to `limit` papers.
    ///
    /// # Errors
    /// Returns `ProviderError` if papers cannot be fetched or parsed
    async fn load_data(&self, topic: &str, limit: usize, full_text: bool) -> ProviderResult<Vec<Paper>>;

    /// Get a human-readable name/description of this provider.
    ///
    /// This is useful for logging and debugging.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: PaperProvider + ?Sized> PaperProvider for std::sync::Arc<T> {
    async fn load_data(&self, topic: &str, limit: usize, full_text: bool) -> ProviderResult<Vec<Paper>> {
        (**self).load_data(topic, limit, full_text).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
