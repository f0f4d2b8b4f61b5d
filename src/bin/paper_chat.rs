//! Interactive chat binary entry point.
//!
//! Builds (or loads from the cache) the index for a research topic and opens a
//! REPL that answers questions about the papers, either as a conversation with
//! memory or as one-off queries with numbered citations.
//!
//! # Examples
//!
//! Chat about a topic:
//! ```bash
//! paper-chat --topic "graph neural networks" --num-papers 10
//! ```
//!
//! Cited answers, streamed as they arrive:
//! ```bash
//! paper-chat --topic "quantum computing" --mode cite --streaming --top-k 3
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use futures_util::StreamExt;
use paper_chat::{
    builder::IndexBuilder,
    chat::{make_chat_engine, make_citation_engine, Answer, CitationQueryEngine, CitationSource, ContextChatEngine},
    embedding::dynamic::DynamicEmbeddingProvider,
    init_logging,
    llm::openai::OpenAIChat,
    models::{Paper, RelevanceLevel, ScoredChunk, ServiceConfig},
    provider::semantic_scholar::SemanticScholarProvider,
    questions::{QuestionGenerator, DEFAULT_NUM_QUESTIONS},
    VectorIndex,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, error, info};

type Embedder = Arc<DynamicEmbeddingProvider>;
type Llm = Arc<OpenAIChat>;

/// How user input is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Conversation with memory and retrieved context
    Chat,
    /// One-off questions answered with numbered citations
    Cite,
}

/// Embedding provider type
#[derive(Debug, Clone, ValueEnum)]
enum EmbeddingProviderType {
    /// OpenAI embeddings (requires OPENAI_API_KEY)
    #[value(name = "openai")]
    OpenAI,
    /// FastEmbed local embedding provider
    FastEmbed,
}

/// Chat with research papers on a topic
#[derive(Parser, Debug)]
#[command(
    name = "paper-chat",
    version,
    about = "Chat with research papers fetched for a topic",
    long_about = "Fetch papers for a research topic, index them, and ask questions about them. \
                  Indexes are cached on disk per (topic, paper count, full-text) and reused.

EXAMPLES:
  Chat about a topic:
    paper-chat --topic \"graph neural networks\"

  Cited answers, streamed:
    paper-chat --topic \"quantum computing\" --mode cite --streaming

  Index full texts with local embeddings:
    paper-chat --topic \"protein folding\" --full-text --embedding-provider fast-embed"
)]
struct Args {
    /// Research topic to fetch papers for
    #[arg(long, value_name = "TEXT")]
    topic: String,

    /// Number of papers to fetch
    #[arg(long, value_name = "N", default_value = "10")]
    num_papers: usize,

    /// Index open-access full texts instead of abstracts
    #[arg(long)]
    full_text: bool,

    /// Initial answer mode (switch with /mode in the REPL)
    #[arg(long, value_enum, default_value = "chat")]
    mode: Mode,

    /// Chunks retrieved per citation query
    #[arg(long, value_name = "K", default_value = "3")]
    top_k: usize,

    /// Stream citation answers as they are generated
    #[arg(long)]
    streaming: bool,

    /// Maximum words per citation source
    #[arg(long, value_name = "WORDS", default_value = "512")]
    citation_chunk_size: usize,

    /// Directory holding cached indexes
    #[arg(long, value_name = "DIR", default_value = ".")]
    cache_root: PathBuf,

    /// Embedding provider to use
    #[arg(long, value_enum, default_value = "openai")]
    embedding_provider: EmbeddingProviderType,

    /// Specific embedding model name (provider-dependent, optional)
    #[arg(long, value_name = "MODEL")]
    embedding_model: Option<String>,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    model_cache_dir: Option<PathBuf>,

    /// Print sample questions after loading the index
    #[arg(long)]
    sample_questions: bool,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Create an embedding provider based on CLI arguments
fn create_embedding_provider(args: &Args, api_key: &str) -> Result<DynamicEmbeddingProvider> {
    let provider = match args.embedding_provider {
        EmbeddingProviderType::OpenAI => {
            DynamicEmbeddingProvider::openai(Some(api_key.to_string()), args.embedding_model.clone())
        }
        EmbeddingProviderType::FastEmbed => {
            DynamicEmbeddingProvider::fastembed(args.embedding_model.as_deref(), args.model_cache_dir.clone())
        }
    };
    provider.context("Failed to initialize embedding provider")
}

/// Shorten `text` to at most `max` characters
fn truncate(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

fn relevance_cell(relevance: RelevanceLevel) -> Cell {
    let (label, color) = match relevance {
        RelevanceLevel::Identical => ("IDENTICAL", Color::Green),
        RelevanceLevel::HighlySimilar => ("HIGHLY_SIMILAR", Color::Cyan),
        RelevanceLevel::Similar => ("SIMILAR", Color::Yellow),
        RelevanceLevel::Relevant => ("RELEVANT", Color::White),
    };
    Cell::new(label).fg(color)
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.into_iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
    table
}

/// Format the context chunks of a chat turn
fn format_context_table(sources: &[ScoredChunk]) -> String {
    let mut table = new_table(vec!["#", "Paper", "Relevance", "Score"]);
    for (i, source) in sources.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(truncate(&source.chunk.title, 60)),
            relevance_cell(source.relevance),
            Cell::new(format!("{:.4}", source.score)),
        ]);
    }
    table.to_string()
}

/// Format the numbered sources of a citation answer
fn format_citation_table(sources: &[CitationSource]) -> String {
    let mut table = new_table(vec!["Source", "Paper", "Excerpt", "Score"]);
    for source in sources {
        table.add_row(vec![
            Cell::new(format!("[{}]", source.number)),
            Cell::new(truncate(&source.title, 40)),
            Cell::new(truncate(&source.text, 80)),
            Cell::new(format!("{:.4}", source.score)),
        ]);
    }
    table.to_string()
}

async fn print_sample_questions(generator: &QuestionGenerator<Llm>, documents: &[Paper], rng: &mut StdRng) {
    match generator.generate(documents, rng, DEFAULT_NUM_QUESTIONS).await {
        Ok(questions) => {
            println!("Sample questions:");
            for (i, question) in questions.iter().enumerate() {
                println!("  {}. {}", i + 1, question);
            }
            println!();
        }
        Err(e) => eprintln!("Could not generate sample questions: {}", e),
    }
}

async fn answer_chat(engine: &mut ContextChatEngine<Llm, Embedder>, line: &str) -> Result<()> {
    let response = engine.chat(line).await.context("Chat turn failed")?;
    println!("\n{}\n", response.response);
    if !response.sources.is_empty() {
        println!("{}", format_context_table(&response.sources));
    }
    Ok(())
}

async fn answer_cite(engine: &CitationQueryEngine<Llm, Embedder>, line: &str) -> Result<()> {
    let response = engine.query(line).await.context("Citation query failed")?;

    println!();
    match response.answer {
        Answer::Complete(text) => println!("{}", text),
        Answer::Streaming(mut stream) => {
            let mut stdout = std::io::stdout();
            while let Some(delta) = stream.next().await {
                let delta = delta.context("Answer stream broke off")?;
                print!("{}", delta);
                stdout.flush().ok();
            }
            println!();
        }
    }
    println!();

    if !response.sources.is_empty() {
        println!("{}", format_citation_table(&response.sources));
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  <question>        - Ask about the papers");
    println!("  /mode chat|cite   - Switch between conversation and cited answers");
    println!("  /reset            - Clear the conversation memory");
    println!("  /questions        - Suggest questions from a random paper");
    println!("  /help             - Show this help");
    println!("  Ctrl+D or Ctrl+C  - Exit");
}

/// Run interactive REPL mode
async fn run_interactive(
    mut mode: Mode,
    mut chat_engine: ContextChatEngine<Llm, Embedder>,
    citation_engine: CitationQueryEngine<Llm, Embedder>,
    generator: QuestionGenerator<Llm>,
    documents: Vec<Paper>,
    mut rng: StdRng,
) -> Result<()> {
    print_help();
    println!();

    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;

    loop {
        let prompt = match mode {
            Mode::Chat => "Chat> ",
            Mode::Cite => "Cite> ",
        };

        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts[0] {
                        "/help" => print_help(),
                        "/mode" => match parts.get(1).copied() {
                            Some("chat") => {
                                mode = Mode::Chat;
                                println!("Switched to chat mode");
                            }
                            Some("cite") => {
                                mode = Mode::Cite;
                                println!("Switched to citation mode");
                            }
                            _ => eprintln!("Usage: /mode chat|cite"),
                        },
                        "/reset" => {
                            chat_engine.reset();
                            println!("Conversation memory cleared");
                        }
                        "/questions" => print_sample_questions(&generator, &documents, &mut rng).await,
                        _ => eprintln!("Unknown command: {}. Type /help for available commands.", parts[0]),
                    }
                    continue;
                }

                let start = Instant::now();
                let result = match mode {
                    Mode::Chat => answer_chat(&mut chat_engine, line).await,
                    Mode::Cite => answer_cite(&citation_engine, line).await,
                };
                match result {
                    Ok(()) => debug!("Answered in {:.2}s", start.elapsed().as_secs_f64()),
                    Err(e) => eprintln!("Error: {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);
    debug!("CLI arguments: {:?}", args);

    if args.num_papers == 0 {
        anyhow::bail!("--num-papers must be at least 1");
    }

    let api_key = std::env::var("OPENAI_API_KEY").context(
        "OPENAI_API_KEY environment variable required for the chat model.\n\
         Set it with: export OPENAI_API_KEY=your-api-key",
    )?;

    let config = ServiceConfig {
        cache_root: args.cache_root.clone(),
        ..ServiceConfig::default()
    };

    let embedder: Embedder = Arc::new(create_embedding_provider(&args, &api_key)?);
    let provider = SemanticScholarProvider::new(None).context("Failed to create Semantic Scholar client")?;
    let builder = IndexBuilder::new(provider, Arc::clone(&embedder), config.clone());

    let start = Instant::now();
    let (index, documents) = builder
        .build_or_load(&args.topic, args.num_papers, args.full_text)
        .await
        .with_context(|| format!("Failed to build index for '{}'", args.topic))?;
    info!(
        "Index ready: {} papers, {} chunks in {:.2}s",
        documents.len(),
        index.len(),
        start.elapsed().as_secs_f64()
    );

    let index: Arc<VectorIndex> = Arc::new(index);
    let llm: Llm = Arc::new(OpenAIChat::new(api_key, config.llm_model.clone(), config.temperature));

    let generator = QuestionGenerator::new(Arc::clone(&llm));
    let mut rng = StdRng::from_entropy();
    if args.sample_questions {
        print_sample_questions(&generator, &documents, &mut rng).await;
    }

    let chat_engine = make_chat_engine(Arc::clone(&index), &args.topic, Arc::clone(&llm), Arc::clone(&embedder));
    let citation_engine = make_citation_engine(
        index,
        args.top_k,
        args.streaming,
        args.citation_chunk_size,
        llm,
        embedder,
    )
    .context("Invalid citation engine settings")?;

    println!("Loaded {} papers on '{}'.", documents.len(), args.topic);
    run_interactive(args.mode, chat_engine, citation_engine, generator, documents, rng).await
}
