//! Chat and citation engines over a [`VectorIndex`].
//!
//! Two front ends share one index:
//!
//! - [`ContextChatEngine`] keeps a bounded conversation memory and, for each
//!   turn, retrieves a few chunks and hands them to the model as context
//!   alongside the system prompt.
//! - [`CitationQueryEngine`] answers one-off questions. Retrieved chunks are
//!   cut into small numbered sources and the model is asked to cite them as
//!   `[n]`; the answer can be returned whole or streamed.
//!
//! The constructors only assemble in-memory objects. All retrieval and model
//! calls happen when a turn or query is run, and their failures propagate to
//! the caller without retry.

use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::index::{chunk_text, IndexError, VectorIndex};
use crate::llm::{ChatMessage, LanguageModel, LlmError, TokenStream};
use crate::models::ScoredChunk;
use crate::prompt::{build_system_prompt, citation_prompt};

/// Token budget of the conversation memory.
pub const DEFAULT_MEMORY_TOKEN_LIMIT: usize = 2000;

/// Chunks retrieved as context for each chat turn.
pub const DEFAULT_CONTEXT_TOP_K: usize = 2;

/// Errors that can occur while running an engine.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Retrieval failed
    #[error("Retrieval error: {0}")]
    IndexError(#[from] IndexError),

    /// The language model call failed
    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    /// Invalid engine parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for engine operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Rough token count of `text`: four characters per token, at least one.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4).max(1)
}

/// Conversation history bounded by an estimated token budget.
///
/// Every message is kept, but [`ChatMemoryBuffer::get`] only returns the most
/// recent messages whose combined estimate fits the limit.
#[derive(Debug, Clone)]
pub struct ChatMemoryBuffer {
    token_limit: usize,
    messages: Vec<ChatMessage>,
}

impl ChatMemoryBuffer {
    pub fn new(token_limit: usize) -> Self {
        Self {
            token_limit,
            messages: Vec::new(),
        }
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    pub fn put(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Most recent messages that fit the token budget, oldest first.
    pub fn get(&self) -> Vec<ChatMessage> {
        self.get_with_reserved(0)
    }

    /// Like [`ChatMemoryBuffer::get`], with `reserved` tokens of the budget
    /// already taken by other parts of the request.
    pub fn get_with_reserved(&self, reserved: usize) -> Vec<ChatMessage> {
        let budget = self.token_limit.saturating_sub(reserved);
        let mut used = 0;
        let mut start = self.messages.len();

        for (i, message) in self.messages.iter().enumerate().rev() {
            let cost = estimate_tokens(&message.content);
            if used + cost > budget {
                break;
            }
            used += cost;
            start = i;
        }

        self.messages[start..].to_vec()
    }

    /// Full history regardless of the budget.
    pub fn get_all(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for ChatMemoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_TOKEN_LIMIT)
    }
}

/// Answer to one chat turn.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub response: String,

    /// Chunks given to the model as context for this turn
    pub sources: Vec<ScoredChunk>,
}

/// Conversational engine with index-backed context and running memory.
pub struct ContextChatEngine<L, E>
where
    L: LanguageModel,
    E: EmbeddingProvider,
{
    index: Arc<VectorIndex>,
    llm: L,
    embedder: E,
    system_prompt: String,
    memory: ChatMemoryBuffer,
    top_k: usize,
}

impl<L, E> ContextChatEngine<L, E>
where
    L: LanguageModel,
    E: EmbeddingProvider,
{
    pub fn new(index: Arc<VectorIndex>, llm: L, embedder: E, system_prompt: String, memory: ChatMemoryBuffer) -> Self {
        Self {
            index,
            llm,
            embedder,
            system_prompt,
            memory,
            top_k: DEFAULT_CONTEXT_TOP_K,
        }
    }

    /// Number of chunks retrieved per turn.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn memory(&self) -> &ChatMemoryBuffer {
        &self.memory
    }

    /// Run one turn: retrieve context, call the model with the history, remember both sides.
    ///
    /// Memory is only updated when the model call succeeds.
    pub async fn chat(&mut self, message: &str) -> ChatResult<ChatResponse> {
        let sources = self.index.retrieve(message, &self.embedder, self.top_k).await?;
        debug!("Retrieved {} context chunks", sources.len());

        // The context shares the memory budget
        let context = self.context_prompt(&sources);
        let history = self.memory.get_with_reserved(estimate_tokens(&context));

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(context));
        messages.extend(history);
        messages.push(ChatMessage::user(message));

        let response = self.llm.complete(&messages).await?;

        self.memory.put(ChatMessage::user(message));
        self.memory.put(ChatMessage::assistant(response.clone()));

        Ok(ChatResponse { response, sources })
    }

    /// Forget the conversation so far.
    pub fn reset(&mut self) {
        self.memory.reset();
    }

    fn context_prompt(&self, sources: &[ScoredChunk]) -> String {
        let context = sources
            .iter()
            .map(|s| format!("{}\n{}", s.chunk.title, s.chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "{}\n\nContext information is below.\n--------------------\n{}\n--------------------\n",
            self.system_prompt, context
        )
    }
}

/// One numbered piece of source text the model may cite.
#[derive(Debug, Clone, PartialEq)]
pub struct CitationSource {
    /// 1-based number used in `[n]` citations
    pub number: usize,

    /// Title of the paper the text came from
    pub title: String,

    pub text: String,

    /// Similarity of the retrieved chunk this source was cut from
    pub score: f32,
}

impl CitationSource {
    pub fn label(&self) -> String {
        format!("Source {}", self.number)
    }
}

/// Answer text, either complete or still arriving.
pub enum Answer {
    Complete(String),
    Streaming(TokenStream),
}

impl Answer {
    /// Wait for the whole answer.
    pub async fn into_string(self) -> ChatResult<String> {
        match self {
            Answer::Complete(text) => Ok(text),
            Answer::Streaming(mut stream) => {
                let mut text = String::new();
                while let Some(delta) = stream.next().await {
                    text.push_str(&delta?);
                }
                Ok(text)
            }
        }
    }
}

impl fmt::Debug for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            Answer::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// Answer to a citation query with the sources its `[n]` markers refer to.
#[derive(Debug)]
pub struct CitationResponse {
    pub answer: Answer,
    pub sources: Vec<CitationSource>,
}

/// Query engine whose answers cite numbered sources.
pub struct CitationQueryEngine<L, E>
where
    L: LanguageModel,
    E: EmbeddingProvider,
{
    index: Arc<VectorIndex>,
    llm: L,
    embedder: E,
    top_k: usize,
    streaming: bool,
    citation_chunk_size: usize,
}

impl<L, E> CitationQueryEngine<L, E>
where
    L: LanguageModel,
    E: EmbeddingProvider,
{
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn streaming(&self) -> bool {
        self.streaming
    }

    pub fn citation_chunk_size(&self) -> usize {
        self.citation_chunk_size
    }

    /// Retrieve, number the sources, and ask the model for a cited answer.
    pub async fn query(&self, query: &str) -> ChatResult<CitationResponse> {
        let retrieved = self.index.retrieve(query, &self.embedder, self.top_k).await?;
        let sources = citation_sources(&retrieved, self.citation_chunk_size);
        debug!("Built {} citation sources from {} chunks", sources.len(), retrieved.len());

        let blocks = sources
            .iter()
            .map(|s| format!("{}:\n{}", s.label(), s.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let messages = vec![ChatMessage::user(citation_prompt(&blocks, query))];

        let answer = if self.streaming {
            Answer::Streaming(self.llm.stream(&messages).await?)
        } else {
            Answer::Complete(self.llm.complete(&messages).await?)
        };

        Ok(CitationResponse { answer, sources })
    }
}

/// Cut retrieved chunks into sources of at most `chunk_size` words, numbered from 1.
pub fn citation_sources(retrieved: &[ScoredChunk], chunk_size: usize) -> Vec<CitationSource> {
    retrieved
        .iter()
        .flat_map(|scored| {
            chunk_text(&scored.chunk.text, chunk_size)
                .into_iter()
                .map(move |text| (scored.chunk.title.clone(), text, scored.score))
        })
        .enumerate()
        .map(|(i, (title, text, score))| CitationSource {
            number: i + 1,
            title,
            text,
            score,
        })
        .collect()
}

/// Conversational engine with a 2000-token memory and the research-space system prompt.
pub fn make_chat_engine<L, E>(index: Arc<VectorIndex>, research_space: &str, llm: L, embedder: E) -> ContextChatEngine<L, E>
where
    L: LanguageModel,
    E: EmbeddingProvider,
{
    let memory = ChatMemoryBuffer::new(DEFAULT_MEMORY_TOKEN_LIMIT);
    let engine = ContextChatEngine::new(index, llm, embedder, build_system_prompt(research_space), memory);
    info!("Loaded chat engine for research space: {}", research_space);
    engine
}

/// Citation query engine retrieving `top_k` chunks cut into `citation_chunk_size`-word sources.
///
/// # Errors
/// `ChatError::InvalidInput` if `top_k` or `citation_chunk_size` is zero.
pub fn make_citation_engine<L, E>(
    index: Arc<VectorIndex>,
    top_k: usize,
    streaming: bool,
    citation_chunk_size: usize,
    llm: L,
    embedder: E,
) -> ChatResult<CitationQueryEngine<L, E>>
where
    L: LanguageModel,
    E: EmbeddingProvider,
{
    if top_k == 0 {
        return Err(ChatError::InvalidInput("top_k must be positive".to_string()));
    }
    if citation_chunk_size == 0 {
        return Err(ChatError::InvalidInput("citation_chunk_size must be positive".to_string()));
    }

    info!("Done creating index, loading chat . . ");
    let engine = CitationQueryEngine {
        index,
        llm,
        embedder,
        top_k,
        streaming,
        citation_chunk_size,
    };
    info!("Done loading chat engine");
    Ok(engine)
}
