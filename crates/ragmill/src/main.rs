//! # Ragmill CLI (`rml`)
//!
//! The `rml` binary drives the ingestion and retrieval engine. It
//! provides commands for database initialization, document ingestion,
//! source inspection, and hybrid search.
//!
//! ## Usage
//!
//! ```bash
//! rml --config ./config/rml.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rml init` | Create the SQLite database and run schema migrations |
//! | `rml ingest <paths...>` | Register and ingest documents from the filesystem |
//! | `rml sources` | List registered sources and their ingestion status |
//! | `rml retry <id-or-location>` | Requeue an errored source |
//! | `rml search "<query>"` | Run a hybrid search over ready sources |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! rml init --config ./config/rml.toml
//!
//! # Ingest a directory of notes
//! rml ingest docs/*.md --config ./config/rml.toml
//!
//! # Re-ingest even when content is unchanged
//! rml ingest docs/report.md --force
//!
//! # Hybrid search with weighted fusion
//! rml search "quarterly revenue" --fusion weighted
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ragmill::api::{self, QueryOptions};
use ragmill::config::{self, Config};
use ragmill::embedding::create_embedder;
use ragmill::ingest::{run_ingestion, DocumentOutcome, PipelineOptions};
use ragmill::sqlite_store::SqliteStore;
use ragmill::{db, migrate, sources};
use ragmill_core::chunker::{StrategyDeps, StrategyKind};
use ragmill_core::models::RegisterRequest;
use ragmill_core::store::{SearchFilters, Store};

/// Ragmill — a document ingestion and hybrid retrieval engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "rml",
    about = "Ragmill — a document ingestion and hybrid retrieval engine",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rml.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (sources, chunks, chunks_fts). Idempotent.
    Init,

    /// Register and ingest documents.
    ///
    /// Each path is read, registered under its absolute location, chunked
    /// with the configured strategy, embedded, and committed. Unchanged
    /// documents are skipped unless `--force` is given.
    Ingest {
        /// Files to ingest.
        paths: Vec<PathBuf>,

        /// Reingest documents whose content is unchanged.
        #[arg(long)]
        force: bool,

        /// Override the configured chunking strategy
        /// (fixed, semantic, hierarchical, contextual, late).
        #[arg(long)]
        strategy: Option<String>,
    },

    /// List registered sources and their ingestion status.
    Sources,

    /// Requeue an errored source for re-ingestion.
    Retry {
        /// Source UUID or location.
        source: String,
    },

    /// Search ready sources.
    Search {
        /// The query string.
        query: String,

        /// Maximum number of passages to return.
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum fused score for a passage to be returned.
        #[arg(long)]
        min_score: Option<f64>,

        /// Fusion policy override: vector, weighted, or rrf.
        #[arg(long)]
        fusion: Option<String>,

        /// Only passages from sources with this document type.
        #[arg(long)]
        document_type: Option<String>,

        /// Only passages from sources with this source type.
        #[arg(long)]
        source_type: Option<String>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn document_type_for(path: &std::path::Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("text")
        .to_lowercase()
}

async fn open_store(cfg: &Config) -> Result<SqliteStore> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;
    Ok(SqliteStore::new(pool))
}

async fn run_ingest(
    cfg: &Config,
    paths: Vec<PathBuf>,
    force: bool,
    strategy: Option<String>,
) -> Result<()> {
    if paths.is_empty() {
        anyhow::bail!("No paths given. Usage: rml ingest <paths...>");
    }
    let embedder = create_embedder(&cfg.embedding)?
        .context("Embedding provider is disabled; configure [embedding] before ingesting")?;

    let strategy = match strategy {
        Some(name) => StrategyKind::parse(&name)?,
        None => cfg.chunking.strategy_kind()?,
    };

    let mut requests = Vec::with_capacity(paths.len());
    for path in paths {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let location = path
            .canonicalize()
            .unwrap_or_else(|_| path.clone())
            .display()
            .to_string();
        let document_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        requests.push(RegisterRequest {
            location,
            document_name,
            document_type: document_type_for(&path),
            source_type: "filesystem".to_string(),
            content,
            metadata: serde_json::json!({}),
            embedding_model: embedder.model_id().to_string(),
        });
    }

    let options = PipelineOptions {
        strategy,
        chunker: cfg.chunking.chunker_config(),
        deps: StrategyDeps {
            embedder: Some(embedder),
            ..StrategyDeps::default()
        },
        concurrency: cfg.ingestion.concurrency,
        max_failures: cfg.ingestion.max_failures,
        embed_timeout: Duration::from_secs(cfg.ingestion.embed_timeout_secs),
        embed_batch_size: cfg.embedding.batch_size,
        force,
    };

    let store: Arc<dyn Store> = Arc::new(open_store(cfg).await?);
    let summary = run_ingestion(store, requests, options).await;

    for report in &summary.reports {
        match &report.outcome {
            DocumentOutcome::Ingested { chunks } => {
                println!("ingested  {} ({} chunks)", report.location, chunks)
            }
            DocumentOutcome::Skipped => println!("skipped   {} (unchanged)", report.location),
            DocumentOutcome::Failed { error } => {
                println!("failed    {}: {}", report.location, error)
            }
        }
    }
    println!(
        "{} ingested, {} skipped, {} failed{}",
        summary.ingested,
        summary.skipped,
        summary.failed,
        if summary.aborted {
            " (aborted at failure threshold)"
        } else {
            ""
        }
    );

    if summary.failed > 0 {
        anyhow::bail!("{} document(s) failed to ingest", summary.failed);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    cfg: &Config,
    query: &str,
    top_k: Option<usize>,
    min_score: Option<f64>,
    fusion: Option<String>,
    document_type: Option<String>,
    source_type: Option<String>,
    json: bool,
) -> Result<()> {
    let store = open_store(cfg).await?;
    let embedder = create_embedder(&cfg.embedding)?;

    let mut retrieval = cfg.retrieval.clone();
    if let Some(name) = fusion {
        retrieval.fusion = name;
    }
    let options = QueryOptions {
        top_k: top_k.unwrap_or(retrieval.top_k),
        min_score: min_score.unwrap_or(retrieval.min_score),
        fusion: retrieval.fusion_policy()?,
        filters: SearchFilters {
            document_type,
            source_type,
        },
        rerank_multiplier: retrieval.rerank_multiplier,
    };

    let response = api::query(&store, embedder.as_deref(), None, query, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.passages.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, passage) in response.passages.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (chunk {})",
            i + 1,
            passage.score,
            passage.citation.location,
            passage.citation.chunk_index
        );
        if let Some(heading) = &passage.citation.section_heading {
            println!("   § {}", heading);
        }
        let preview: String = passage.text.chars().take(240).collect();
        println!("   {}\n", preview.replace('\n', " "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            paths,
            force,
            strategy,
        } => {
            run_ingest(&cfg, paths, force, strategy).await?;
        }
        Commands::Sources => {
            let store = open_store(&cfg).await?;
            sources::list_sources(&store).await?;
        }
        Commands::Retry { source } => {
            let store = open_store(&cfg).await?;
            sources::retry_source(&store, &source).await?;
        }
        Commands::Search {
            query,
            top_k,
            min_score,
            fusion,
            document_type,
            source_type,
            json,
        } => {
            run_search(
                &cfg,
                &query,
                top_k,
                min_score,
                fusion,
                document_type,
                source_type,
                json,
            )
            .await?;
        }
    }

    Ok(())
}
