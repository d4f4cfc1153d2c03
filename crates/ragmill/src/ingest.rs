//! Ingestion pipeline: register, chunk, embed, and commit documents.
//!
//! One document moves through `pending -> processing -> ready` (or
//! `error`); a batch run processes up to `concurrency` documents at a
//! time and reports per-document outcomes plus a run summary. A document
//! whose content hash is unchanged is skipped without touching its
//! chunks; `force` overrides that and requeues it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use ragmill_core::chunker::{build_strategy, ChunkerConfig, StrategyDeps, StrategyKind};
use ragmill_core::models::{build_chunks, NormalizedDocument, RegisterRequest, SourceStatus};
use ragmill_core::registry;
use ragmill_core::store::Store;
use ragmill_core::{Error, Result};

/// Behavior knobs for one ingestion run.
#[derive(Clone)]
pub struct PipelineOptions {
    pub strategy: StrategyKind,
    pub chunker: ChunkerConfig,
    pub deps: StrategyDeps,
    pub concurrency: usize,
    /// Abort the run after this many failures; `0` disables the threshold.
    pub max_failures: usize,
    /// Wall-clock budget for the embedding pass of one document.
    pub embed_timeout: Duration,
    /// Texts per embedding request; a document's pending chunks are
    /// embedded in groups of this size.
    pub embed_batch_size: usize,
    /// Reingest documents whose content hash is unchanged.
    pub force: bool,
}

/// What happened to one document.
#[derive(Debug)]
pub enum DocumentOutcome {
    Ingested { chunks: usize },
    Skipped,
    Failed { error: String },
}

#[derive(Debug)]
pub struct DocumentReport {
    pub location: String,
    pub outcome: DocumentOutcome,
    pub elapsed: Duration,
}

/// Aggregate result of a batch run.
#[derive(Debug, Default)]
pub struct IngestionSummary {
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chunks_created: usize,
    /// True when the run stopped early at the failure threshold.
    pub aborted: bool,
    pub reports: Vec<DocumentReport>,
}

impl IngestionSummary {
    fn record(&mut self, report: DocumentReport) {
        match &report.outcome {
            DocumentOutcome::Ingested { chunks } => {
                self.ingested += 1;
                self.chunks_created += *chunks;
            }
            DocumentOutcome::Skipped => self.skipped += 1,
            DocumentOutcome::Failed { .. } => self.failed += 1,
        }
        self.reports.push(report);
    }
}

/// Ingest one registered source: chunk, embed, commit, mark ready.
///
/// The caller must have won the `pending -> processing` transition; on any
/// failure after that point the source is marked `error` with the cause.
async fn process_source<S: Store + ?Sized>(
    store: &S,
    source_id: &str,
    content: &str,
    options: &PipelineOptions,
) -> Result<usize> {
    let source = registry::begin_processing(store, source_id).await?;
    info!(location = %source.location, strategy = options.strategy.as_str(), "ingestion started");

    let result = async {
        let doc = NormalizedDocument::from_text(content);
        let strategy = build_strategy(options.strategy, &options.chunker, &options.deps)?;
        let drafts = strategy.split(&doc).await?;
        if drafts.is_empty() {
            return Err(Error::validation(format!(
                "document {} produced no chunks",
                source.location
            )));
        }

        let pending: Vec<String> = drafts
            .iter()
            .filter(|d| d.searchable && d.embedding.is_none())
            .map(|d| d.text.clone())
            .collect();

        let vectors = if pending.is_empty() {
            Vec::new()
        } else {
            let embedder = options
                .deps
                .embedder
                .clone()
                .ok_or_else(|| Error::validation("no embedding provider configured"))?;
            let batch = options.embed_batch_size.max(1);
            tokio::time::timeout(options.embed_timeout, async {
                let mut all = Vec::with_capacity(pending.len());
                for group in pending.chunks(batch) {
                    all.extend(embedder.embed_batch(group).await?);
                }
                Ok::<_, Error>(all)
            })
            .await
            .map_err(|_| {
                Error::embedding(format!(
                    "embedding timed out after {}s",
                    options.embed_timeout.as_secs()
                ))
            })??
        };

        let chunks = build_chunks(&source, drafts, vectors)?;
        store.replace_chunks(&source.id, &chunks).await?;
        Ok(chunks.len())
    }
    .await;

    match result {
        Ok(count) => {
            registry::mark_ready(store, &source.id).await?;
            info!(location = %source.location, chunks = count, "ingestion finished");
            Ok(count)
        }
        Err(e) => {
            error!(location = %source.location, error = %e, "ingestion failed");
            registry::mark_error(store, &source.id, &e.to_string()).await?;
            Err(e)
        }
    }
}

/// Register and ingest one document end to end.
pub async fn ingest_one<S: Store + ?Sized>(
    store: &S,
    request: RegisterRequest,
    options: &PipelineOptions,
) -> DocumentReport {
    let location = request.location.clone();
    let content = request.content.clone();
    let started = Instant::now();

    let outcome = async {
        let (source, mut needs_work) = registry::register(store, request).await?;
        if !needs_work && options.force {
            registry::force_requeue(store, &source).await?;
            needs_work = true;
        }
        // A previous failed attempt left the row pending or errored;
        // pick it up even though the hash is unchanged.
        if !needs_work && source.status == SourceStatus::Pending {
            needs_work = true;
        }
        if !needs_work && source.status == SourceStatus::Error {
            registry::retry(store, &source.id).await?;
            needs_work = true;
        }
        if !needs_work {
            return Ok(DocumentOutcome::Skipped);
        }
        let chunks = process_source(store, &source.id, &content, options).await?;
        Ok::<_, Error>(DocumentOutcome::Ingested { chunks })
    }
    .await
    .unwrap_or_else(|e| DocumentOutcome::Failed {
        error: e.to_string(),
    });

    DocumentReport {
        location,
        outcome,
        elapsed: started.elapsed(),
    }
}

/// Run a batch of documents through the pipeline with bounded
/// concurrency.
pub async fn run_ingestion(
    store: Arc<dyn Store>,
    requests: Vec<RegisterRequest>,
    options: PipelineOptions,
) -> IngestionSummary {
    let total = requests.len();
    info!(documents = total, concurrency = options.concurrency, "ingestion run started");

    let mut summary = IngestionSummary::default();
    let mut queue = requests.into_iter();
    let mut tasks = JoinSet::new();

    loop {
        while tasks.len() < options.concurrency.max(1) {
            let Some(request) = queue.next() else { break };
            let store = Arc::clone(&store);
            let options = options.clone();
            tasks.spawn(async move { ingest_one(store.as_ref(), request, &options).await });
        }

        let Some(joined) = tasks.join_next().await else { break };
        match joined {
            Ok(report) => summary.record(report),
            Err(e) => {
                error!(error = %e, "ingestion task panicked");
                summary.failed += 1;
            }
        }

        if options.max_failures > 0 && summary.failed >= options.max_failures {
            warn!(
                failed = summary.failed,
                threshold = options.max_failures,
                "failure threshold reached, aborting run"
            );
            summary.aborted = true;
            tasks.abort_all();
            break;
        }
    }

    info!(
        ingested = summary.ingested,
        skipped = summary.skipped,
        failed = summary.failed,
        aborted = summary.aborted,
        "ingestion run finished"
    );
    summary
}
