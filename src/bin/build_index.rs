//! Index warm-up binary entry point.
//!
//! Builds the cached index for a research topic ahead of time, or reports on
//! the existing cache entry, so that `paper-chat` starts without waiting on
//! the literature source and the embeddings API.
//!
//! # Examples
//!
//! ```bash
//! build-index --topic "graph neural networks" --num-papers 10
//! build-index --topic "protein folding" --full-text --cache-root ./indexes
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use paper_chat::{
    builder::IndexBuilder,
    cache::cache_key,
    embedding::{dynamic::DynamicEmbeddingProvider, EmbeddingProvider},
    init_logging,
    models::ServiceConfig,
    provider::semantic_scholar::SemanticScholarProvider,
};
use tracing::{debug, info};

/// Embedding provider type
#[derive(Debug, Clone, ValueEnum)]
enum EmbeddingProviderType {
    /// OpenAI embeddings (requires OPENAI_API_KEY)
    #[value(name = "openai")]
    OpenAI,
    /// FastEmbed local embedding provider (no API key required)
    FastEmbed,
}

/// Build or load the cached index for a research topic
#[derive(Parser, Debug)]
#[command(
    name = "build-index",
    version,
    about = "Build the cached paper index for a research topic",
    long_about = "Fetch papers for a topic, embed them and persist the index under the cache root. \
                  An existing complete entry is loaded and summarized instead of rebuilt.

EXAMPLES:
  Build with OpenAI embeddings:
    OPENAI_API_KEY=sk-... build-index --topic \"graph neural networks\" --num-papers 10

  Full texts with local embeddings:
    build-index --topic \"protein folding\" --full-text --embedding-provider fast-embed"
)]
struct BuildArgs {
    /// Research topic to fetch papers for
    #[arg(long, value_name = "TEXT")]
    topic: String,

    /// Number of papers to fetch
    #[arg(long, value_name = "N", default_value = "10")]
    num_papers: usize,

    /// Index open-access full texts instead of abstracts
    #[arg(long)]
    full_text: bool,

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

    /// Words per indexed chunk
    #[arg(long, value_name = "WORDS", default_value = "512")]
    chunk_size: usize,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Create an embedding provider based on CLI arguments
fn create_embedding_provider(args: &BuildArgs) -> Result<DynamicEmbeddingProvider> {
    match args.embedding_provider {
        EmbeddingProviderType::OpenAI => DynamicEmbeddingProvider::openai(None, args.embedding_model.clone())
            .context("Failed to initialize OpenAI embeddings"),
        EmbeddingProviderType::FastEmbed => {
            DynamicEmbeddingProvider::fastembed(args.embedding_model.as_deref(), args.model_cache_dir.clone())
                .context("Failed to initialize FastEmbed provider")
        }
    }
}

/// Create a spinner for the build
fn create_spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .context("Invalid spinner template")?,
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    Ok(spinner)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = BuildArgs::parse();
    init_logging(&args.log_level);
    debug!("CLI arguments: {:?}", args);

    if args.num_papers == 0 {
        anyhow::bail!("--num-papers must be at least 1");
    }

    let start_time = Instant::now();

    let config = ServiceConfig {
        cache_root: args.cache_root.clone(),
        chunk_size: args.chunk_size,
        ..ServiceConfig::default()
    };

    let embedder = create_embedding_provider(&args)?;
    let provider = SemanticScholarProvider::new(None).context("Failed to create Semantic Scholar client")?;
    let builder = IndexBuilder::new(provider, embedder, config);

    let key = cache_key(&args.topic, args.num_papers, args.full_text);
    let entry = builder.cache().entry_path(&key);
    let cached = builder.cache().is_complete(&key);

    let spinner = create_spinner(if cached {
        format!("Loading {}", entry.display())
    } else {
        format!("Fetching and embedding papers for '{}'", args.topic)
    })?;

    let result = builder
        .build_or_load(&args.topic, args.num_papers, args.full_text)
        .await
        .with_context(|| format!("Failed to build index for '{}'", args.topic));

    let (index, documents) = match result {
        Ok(built) => {
            spinner.finish_with_message("done");
            built
        }
        Err(e) => {
            spinner.abandon_with_message("failed");
            return Err(e);
        }
    };

    let elapsed = start_time.elapsed();
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Index {:<28}║", if cached { "Loaded" } else { "Built" });
    println!("╠════════════════════════════════════════╣");
    println!("║ Papers:               {:>16} ║", documents.len());
    println!("║ Chunks:               {:>16} ║", index.len());
    println!("║ Embedding dimension:  {:>16} ║", builder.embedder().dimension());
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");
    println!("Embedding model: {}", index.embedding_config().model_name);
    println!("Cache entry:     {}", entry.display());

    info!("Index for '{}' ready", args.topic);
    Ok(())
}
