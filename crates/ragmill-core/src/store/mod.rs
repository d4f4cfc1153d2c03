//! Storage abstraction for sources and chunks.
//!
//! The [`Store`] trait is the only shared mutable surface of the system.
//! All writers go through it; `replace_chunks` is the sole chunk mutation
//! entry point and the unit of atomicity. Readers operate on whatever
//! committed snapshot is visible and never need locks.
//!
//! Implementations must be `Send + Sync`. The in-memory backend
//! ([`memory::InMemoryStore`]) is the reference used by tests; the SQLite
//! backend lives in the application crate.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, Source, SourceStatus};

/// Optional source-level constraints applied to candidate retrieval.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Only chunks whose source has this `document_type`.
    pub document_type: Option<String>,
    /// Only chunks whose source has this `source_type`.
    pub source_type: Option<String>,
}

impl SearchFilters {
    pub fn matches(&self, source: &Source) -> bool {
        if let Some(dt) = &self.document_type {
            if &source.document_type != dt {
                return false;
            }
        }
        if let Some(st) = &self.source_type {
            if &source.source_type != st {
                return false;
            }
        }
        true
    }
}

/// A candidate chunk returned by one retrieval signal.
///
/// Carries enough chunk state for fusion, tie-breaking, reranking, and
/// parent resolution without further round-trips.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub source_id: String,
    pub chunk_index: i64,
    pub parent_index: Option<i64>,
    pub text: String,
    pub page_number: Option<i64>,
    pub section_heading: Option<String>,
    /// Raw signal score: cosine similarity, lexical rank, or trigram
    /// similarity depending on the producing method.
    pub raw_score: f64,
}

/// Abstract storage backend.
///
/// Status changes go through [`transition_status`](Store::transition_status),
/// a compare-and-swap that both validates the finite-state machine and
/// serves as the per-source ingestion mutex. `replace_chunks` deletes and
/// inserts a source's chunk set in one atomic unit; on any failure the
/// store is left exactly as before the call.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a newly registered source.
    async fn insert_source(&self, source: &Source) -> Result<()>;

    /// Overwrite a source row (re-registration with changed content).
    async fn update_source(&self, source: &Source) -> Result<()>;

    async fn source_by_id(&self, id: &str) -> Result<Option<Source>>;

    async fn source_by_location(&self, location: &str) -> Result<Option<Source>>;

    /// All sources, ordered by `location` for stable listings.
    async fn list_sources(&self) -> Result<Vec<Source>>;

    /// Compare-and-swap status update.
    ///
    /// Moves the source from `expected` to `next` and returns the updated
    /// row. Fails with [`crate::Error::InvalidState`] when the current
    /// status differs from `expected` (the attempt fails rather than
    /// blocking). `error_message` is stored on `next == Error` and cleared
    /// otherwise.
    async fn transition_status(
        &self,
        source_id: &str,
        expected: SourceStatus,
        next: SourceStatus,
        error_message: Option<&str>,
    ) -> Result<Source>;

    async fn count_sources_with_status(&self, status: SourceStatus) -> Result<u64>;

    /// Atomically replace the full chunk set of a source.
    ///
    /// A duplicate `(source_id, chunk_index)` anywhere in the batch fails
    /// the whole call with no partial insert.
    async fn replace_chunks(&self, source_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// All chunks of a source, ordered by `chunk_index` ascending.
    async fn chunks_by_source(&self, source_id: &str) -> Result<Vec<Chunk>>;

    /// Look up one chunk by its position within a source (parent
    /// resolution for hierarchical retrieval).
    async fn chunk_by_index(&self, source_id: &str, chunk_index: i64) -> Result<Option<Chunk>>;

    /// Vector-similarity candidates over searchable chunks whose
    /// `embedding_model` equals `model`, best first.
    async fn vector_candidates(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Lexical relevance candidates from the lexical projection.
    async fn lexical_candidates(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Fuzzy similarity candidates from the trigram projection.
    async fn fuzzy_candidates(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkCandidate>>;
}
