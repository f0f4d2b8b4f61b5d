//! Paper Chat - citation-aware chat over research papers.
//!
//! This library builds a retrieval-augmented assistant for a research topic:
//! it fetches papers from a literature search service, indexes them for
//! semantic search, caches the index on disk, and answers questions about the
//! papers either conversationally or with numbered citations.
//!
//! # Architecture
//!
//! - **models**: Core data structures (Paper, Chunk, ScoredChunk, ServiceConfig)
//! - **provider**: Literature sources (Semantic Scholar)
//! - **embedding**: Text embedding backends (OpenAI, FastEmbed)
//! - **llm**: Chat-completion backends (OpenAI) with streaming
//! - **index**: Chunking, embedding and cosine retrieval
//! - **cache**: On-disk cache entries with completion markers and per-key locks
//! - **builder**: Build-or-load of the index for a research space
//! - **questions**: Sample question generation from a random paper
//! - **prompt**: System prompt for the chat engine
//! - **chat**: Context chat engine and citation query engine
//! - **logging**: Idempotent tracing setup
//!
//! # Workflow
//!
//! 1. Build or load the index for a (topic, paper count, full-text) request
//! 2. Optionally generate sample questions from one of the papers
//! 3. Wrap the index in a chat engine or a citation engine
//! 4. Answer user turns, retrieving context chunks for each
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use paper_chat::{
//!     builder::IndexBuilder,
//!     chat::make_citation_engine,
//!     embedding::openai::OpenAIEmbedding,
//!     llm::openai::OpenAIChat,
//!     provider::semantic_scholar::SemanticScholarProvider,
//!     ServiceConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServiceConfig::default();
//!     let embedder = Arc::new(OpenAIEmbedding::new(api_key.clone(), None));
//!     let builder = IndexBuilder::new(SemanticScholarProvider::new(None)?, embedder.clone(), config.clone());
//!
//!     let (index, _documents) = builder.build_or_load("graph neural networks", 10, false).await?;
//!
//!     let llm = OpenAIChat::new(api_key, config.llm_model, config.temperature);
//!     let engine = make_citation_engine(Arc::new(index), 3, false, 512, llm, embedder)?;
//!     let response = engine.query("How do message passing networks aggregate?").await?;
//!     println!("{}", response.answer.into_string().await?);
//!     Ok(())
//! }
//! ```

// Public modules
pub mod builder;
pub mod cache;
pub mod chat;
pub mod embedding;
pub mod index;
pub mod llm;
pub mod logging;
pub mod models;
pub mod prompt;
pub mod provider;
pub mod questions;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types at the crate root
pub use builder::{BuildError, IndexBuilder};
pub use cache::{cache_key, IndexCache};
pub use chat::{make_chat_engine, make_citation_engine, ChatMemoryBuffer, CitationQueryEngine, ContextChatEngine};
pub use embedding::EmbeddingProvider;
pub use index::VectorIndex;
pub use llm::LanguageModel;
pub use logging::init_logging;
pub use models::{Author, EmbeddingConfig, Paper, RelevanceLevel, ScoredChunk, ServiceConfig};
pub use prompt::build_system_prompt;
pub use provider::PaperProvider;
pub use questions::generate_questions;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Chat model used for answers and question generation
pub const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo";

/// Default embedding model name
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
