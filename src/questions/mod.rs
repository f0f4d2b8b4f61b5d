//! Sample question generation.
//!
//! Picks one paper at random from a document set and asks the language model
//! to write quiz-style questions about it. The questions are shown to users as
//! conversation starters and used for manual evaluation of answers.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::index::chunk_text;
use crate::llm::{ChatMessage, LanguageModel, LlmError};
use crate::models::Paper;

/// Number of questions produced per request.
pub const DEFAULT_NUM_QUESTIONS: usize = 3;

/// Words per chunk handed to the model.
pub const DEFAULT_QUESTION_CHUNK_SIZE: usize = 512;

/// Errors that can occur while generating questions.
#[derive(Debug, Error)]
pub enum QuestionError {
    /// There is no paper to pick from
    #[error("Cannot generate questions from an empty document set")]
    EmptyDocumentSet,

    /// The language model call failed
    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),
}

/// Result type for question generation.
pub type QuestionResult<T> = Result<T, QuestionError>;

/// Generates evaluation questions from a randomly chosen paper.
pub struct QuestionGenerator<L>
where
    L: LanguageModel,
{
    llm: L,
    chunk_size: usize,
}

impl<L> QuestionGenerator<L>
where
    L: LanguageModel,
{
    pub fn new(llm: L) -> Self {
        Self {
            llm,
            chunk_size: DEFAULT_QUESTION_CHUNK_SIZE,
        }
    }

    /// Override the number of words per chunk sent to the model.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Pick one paper uniformly at random and generate `num_questions` about it.
    ///
    /// The paper is split into chunks and the model is asked chunk by chunk
    /// until enough questions are collected. The count is capped at
    /// `num_questions` but not padded; the model output is not checked
    /// beyond dropping blank lines.
    ///
    /// # Errors
    /// - `QuestionError::EmptyDocumentSet` if `documents` is empty
    /// - `QuestionError::LlmError` if a model call fails
    pub async fn generate<R>(&self, documents: &[Paper], rng: &mut R, num_questions: usize) -> QuestionResult<Vec<String>>
    where
        R: Rng + ?Sized,
    {
        let paper = documents.choose(rng).ok_or(QuestionError::EmptyDocumentSet)?;
        info!("Generating {} questions from '{}'", num_questions, paper.title);

        let mut chunks = chunk_text(&paper.text, self.chunk_size);
        if chunks.is_empty() {
            chunks.push(paper.title.clone());
        }

        let mut questions = Vec::with_capacity(num_questions);
        for chunk in &chunks {
            if questions.len() >= num_questions {
                break;
            }
            let messages = question_prompt(chunk, num_questions);
            let answer = self.llm.complete(&messages).await?;
            let parsed = parse_questions(&answer);
            debug!("Model returned {} questions for one chunk", parsed.len());
            questions.extend(parsed);
        }

        questions.truncate(num_questions);
        Ok(questions)
    }
}

/// Generate the default three questions from one random paper in `documents`.
pub async fn generate_questions<L, R>(documents: &[Paper], llm: L, rng: &mut R) -> QuestionResult<Vec<String>>
where
    L: LanguageModel,
    R: Rng + ?Sized,
{
    QuestionGenerator::new(llm)
        .generate(documents, rng, DEFAULT_NUM_QUESTIONS)
        .await
}

fn question_prompt(context: &str, num_questions: usize) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You are a Teacher/Professor. Your task is to set up {} questions for an upcoming \
             quiz/examination. The questions should be diverse in nature across the document. \
             Restrict the questions to the context information provided.",
            num_questions
        )),
        ChatMessage::user(format!(
            "Context information is below.\n---------------------\n{}\n---------------------\n\
             Given the context information and not prior knowledge, generate only questions, \
             one per line.",
            context
        )),
    ]
}

/// Split model output into one question per non-empty line, dropping list markers.
fn parse_questions(answer: &str) -> Vec<String> {
    answer
        .lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line.trim_start_matches(|c: char| c == '-' || c == '*' || c == '•').trim_start();

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return stripped.trim_start();
        }
    }
    line
}
