//! In-memory [`Store`] implementation.
//!
//! Reference backend used by unit and engine tests. `HashMap` and `Vec`
//! behind `std::sync::RwLock`; vector search is brute-force cosine over
//! all stored vectors, lexical scoring is term overlap, fuzzy scoring is
//! trigram Jaccard. Chunk replacement swaps the whole per-source set
//! under the write lock, so readers see either the old or the new batch.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{Chunk, Source, SourceStatus};
use crate::projection;

use super::{ChunkCandidate, SearchFilters, Store};

/// In-memory store for tests and examples.
#[derive(Default)]
pub struct InMemoryStore {
    sources: RwLock<HashMap<String, Source>>,
    /// Chunk sets keyed by source id.
    chunks: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> Error {
        Error::store("in-memory store lock poisoned")
    }

    fn candidate(chunk: &Chunk, raw_score: f64) -> ChunkCandidate {
        ChunkCandidate {
            chunk_id: chunk.id.clone(),
            source_id: chunk.source_id.clone(),
            chunk_index: chunk.chunk_index,
            parent_index: chunk.parent_index,
            text: chunk.text.clone(),
            page_number: chunk.page_number,
            section_heading: chunk.section_heading.clone(),
            raw_score,
        }
    }

    /// Collect searchable chunks passing the source filters, with a
    /// per-chunk score function; sorted best first, stable by
    /// `(source_id, chunk_index)`.
    fn scored_candidates<F>(
        &self,
        limit: usize,
        filters: &SearchFilters,
        score: F,
    ) -> Result<Vec<ChunkCandidate>>
    where
        F: Fn(&Chunk) -> Option<f64>,
    {
        let sources = self.sources.read().map_err(|_| Self::lock_err())?;
        let chunks = self.chunks.read().map_err(|_| Self::lock_err())?;

        let mut candidates: Vec<ChunkCandidate> = Vec::new();
        for (source_id, set) in chunks.iter() {
            let Some(source) = sources.get(source_id) else {
                continue;
            };
            if !filters.matches(source) {
                continue;
            }
            for chunk in set.iter().filter(|c| c.searchable) {
                if let Some(s) = score(chunk) {
                    candidates.push(Self::candidate(chunk, s));
                }
            }
        }
        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source_id.cmp(&b.source_id))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_source(&self, source: &Source) -> Result<()> {
        let mut sources = self.sources.write().map_err(|_| Self::lock_err())?;
        if sources.values().any(|s| s.location == source.location) {
            return Err(Error::store(format!(
                "location already registered: {}",
                source.location
            )));
        }
        sources.insert(source.id.clone(), source.clone());
        Ok(())
    }

    async fn update_source(&self, source: &Source) -> Result<()> {
        let mut sources = self.sources.write().map_err(|_| Self::lock_err())?;
        if !sources.contains_key(&source.id) {
            return Err(Error::store(format!("unknown source id: {}", source.id)));
        }
        sources.insert(source.id.clone(), source.clone());
        Ok(())
    }

    async fn source_by_id(&self, id: &str) -> Result<Option<Source>> {
        let sources = self.sources.read().map_err(|_| Self::lock_err())?;
        Ok(sources.get(id).cloned())
    }

    async fn source_by_location(&self, location: &str) -> Result<Option<Source>> {
        let sources = self.sources.read().map_err(|_| Self::lock_err())?;
        Ok(sources.values().find(|s| s.location == location).cloned())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let sources = self.sources.read().map_err(|_| Self::lock_err())?;
        let mut all: Vec<Source> = sources.values().cloned().collect();
        all.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(all)
    }

    async fn transition_status(
        &self,
        source_id: &str,
        expected: SourceStatus,
        next: SourceStatus,
        error_message: Option<&str>,
    ) -> Result<Source> {
        let mut sources = self.sources.write().map_err(|_| Self::lock_err())?;
        let source = sources
            .get_mut(source_id)
            .ok_or_else(|| Error::store(format!("unknown source id: {source_id}")))?;
        if source.status != expected {
            return Err(Error::InvalidState {
                source_id: source_id.to_string(),
                current: source.status,
                requested: next,
            });
        }
        source.status = next;
        source.error_message = if next == SourceStatus::Error {
            error_message.map(str::to_string)
        } else {
            None
        };
        source.updated_at = chrono::Utc::now().timestamp();
        Ok(source.clone())
    }

    async fn count_sources_with_status(&self, status: SourceStatus) -> Result<u64> {
        let sources = self.sources.read().map_err(|_| Self::lock_err())?;
        Ok(sources.values().filter(|s| s.status == status).count() as u64)
    }

    async fn replace_chunks(&self, source_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for chunk in chunks {
            if chunk.source_id != source_id {
                return Err(Error::validation(format!(
                    "chunk {} belongs to source {}, not {source_id}",
                    chunk.id, chunk.source_id
                )));
            }
            if !seen.insert(chunk.chunk_index) {
                return Err(Error::validation(format!(
                    "duplicate chunk_index {} for source {source_id}",
                    chunk.chunk_index
                )));
            }
        }
        let mut stored = self.chunks.write().map_err(|_| Self::lock_err())?;
        stored.insert(source_id.to_string(), chunks.to_vec());
        Ok(())
    }

    async fn chunks_by_source(&self, source_id: &str) -> Result<Vec<Chunk>> {
        let stored = self.chunks.read().map_err(|_| Self::lock_err())?;
        let mut set = stored.get(source_id).cloned().unwrap_or_default();
        set.sort_by_key(|c| c.chunk_index);
        Ok(set)
    }

    async fn chunk_by_index(&self, source_id: &str, chunk_index: i64) -> Result<Option<Chunk>> {
        let stored = self.chunks.read().map_err(|_| Self::lock_err())?;
        Ok(stored
            .get(source_id)
            .and_then(|set| set.iter().find(|c| c.chunk_index == chunk_index))
            .cloned())
    }

    async fn vector_candidates(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkCandidate>> {
        self.scored_candidates(limit, filters, |chunk| {
            if chunk.embedding_model != model {
                return None;
            }
            chunk
                .embedding
                .as_ref()
                .map(|v| cosine_similarity(query_vec, v) as f64)
        })
    }

    async fn lexical_candidates(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkCandidate>> {
        self.scored_candidates(limit, filters, |chunk| {
            let score = projection::lexical_overlap(&chunk.lexical, query);
            (score > 0.0).then_some(score)
        })
    }

    async fn fuzzy_candidates(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkCandidate>> {
        let query_set = projection::trigram_set(query);
        self.scored_candidates(limit, filters, |chunk| {
            let chunk_set = projection::parse_trigram_projection(&chunk.trigrams);
            let score = projection::trigram_similarity(&query_set, &chunk_set);
            (score > 0.0).then_some(score)
        })
    }
}
