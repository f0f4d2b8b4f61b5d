//! Language model abstraction.
//!
//! The chat engines and the question generator only need "send these
//! messages, get text back", either whole or as a stream of deltas. This
//! module defines that seam and the message types that cross it; the hosted
//! OpenAI implementation lives in [`openai`].

pub mod openai;

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when calling a language model.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// The response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A streaming response broke off
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Configuration error (e.g., missing API key)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for language model operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Incremental answer text.
pub type TokenStream = BoxStream<'static, LlmResult<String>>;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Trait for chat-completion backends.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a completion and return the full answer text.
    async fn complete(&self, messages: &[ChatMessage]) -> LlmResult<String>;

    /// Run a completion and return the answer as a stream of text deltas.
    ///
    /// The default implementation waits for the whole answer and yields it
    /// as a single item.
    async fn stream(&self, messages: &[ChatMessage]) -> LlmResult<TokenStream> {
        let text = self.complete(messages).await?;
        Ok(Box::pin(stream::once(async move { Ok::<_, LlmError>(text) })))
    }

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for std::sync::Arc<T> {
    async fn complete(&self, messages: &[ChatMessage]) -> LlmResult<String> {
        (**self).complete(messages).await
    }

    async fn stream(&self, messages: &[ChatMessage]) -> LlmResult<TokenStream> {
        (**self).stream(messages).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}
