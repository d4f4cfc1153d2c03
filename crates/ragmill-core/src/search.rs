//! Hybrid query engine: vector, lexical, and fuzzy signals fused into one
//! ranking.
//!
//! The engine operates entirely through the [`Store`] trait. The calling
//! application embeds the query, constructs a [`SearchRequest`], and
//! passes the store (and optionally a [`Reranker`]).
//!
//! # Algorithm
//!
//! 1. Fetch vector candidates for chunks whose `embedding_model` matches
//!    the query embedding's model (`score = cosine similarity`).
//! 2. Fetch lexical and fuzzy candidates when the fusion policy enables
//!    them. A failed auxiliary signal is excluded with a warning instead
//!    of failing the query.
//! 3. Fuse per the configured [`FusionPolicy`].
//! 4. Drop fused scores below `min_score`.
//! 5. Sort score descending; ties broken by `chunk_index` ascending, then
//!    source id, for reproducible output.
//! 6. Truncate to `top_k` (over-fetching `rerank_multiplier × top_k`
//!    first when a reranker is attached).
//! 7. Resolve hierarchical children to their parent's text and join each
//!    hit with its source's name and metadata for citation.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{Error, Result};
use crate::store::{ChunkCandidate, SearchFilters, Store};

/// Default result count.
pub const DEFAULT_TOP_K: usize = 10;
/// Default fused-score floor.
pub const DEFAULT_MIN_SCORE: f64 = 0.2;
/// Default candidate over-fetch factor when reranking.
pub const DEFAULT_RERANK_MULTIPLIER: usize = 4;

/// How the enabled signals combine into one fused score.
///
/// The source material leaves the exact combination open, so the policy
/// is pluggable rather than hard-coded. `VectorOnly` is the default; the
/// weighted default splits 0.6 / 0.25 / 0.15 across vector, lexical, and
/// fuzzy.
#[derive(Debug, Clone, PartialEq)]
pub enum FusionPolicy {
    /// Single-signal vector score (cosine similarity).
    VectorOnly,
    /// Weighted sum over normalized signals. A zero weight disables that
    /// signal; weights are renormalized over the signals actually
    /// available at query time.
    WeightedSum {
        vector: f64,
        lexical: f64,
        fuzzy: f64,
    },
    /// Reciprocal-rank fusion: `Σ 1 / (k + rank)` across enabled
    /// signals. Scores live well below 1.0, so pair with a small
    /// `min_score`.
    ReciprocalRank { k: f64 },
}

impl Default for FusionPolicy {
    fn default() -> Self {
        FusionPolicy::VectorOnly
    }
}

impl FusionPolicy {
    /// The documented default weighting for hybrid fusion.
    pub fn weighted_default() -> Self {
        FusionPolicy::WeightedSum {
            vector: 0.6,
            lexical: 0.25,
            fuzzy: 0.15,
        }
    }

    pub fn rrf_default() -> Self {
        FusionPolicy::ReciprocalRank { k: 60.0 }
    }

    fn uses_lexical(&self) -> bool {
        match self {
            FusionPolicy::VectorOnly => false,
            FusionPolicy::WeightedSum { lexical, .. } => *lexical > 0.0,
            FusionPolicy::ReciprocalRank { .. } => true,
        }
    }

    fn uses_fuzzy(&self) -> bool {
        match self {
            FusionPolicy::VectorOnly => false,
            FusionPolicy::WeightedSum { fuzzy, .. } => *fuzzy > 0.0,
            FusionPolicy::ReciprocalRank { .. } => true,
        }
    }

    fn uses_vector(&self) -> bool {
        match self {
            FusionPolicy::VectorOnly => true,
            FusionPolicy::WeightedSum { vector, .. } => *vector > 0.0,
            FusionPolicy::ReciprocalRank { .. } => true,
        }
    }
}

/// Second-pass scorer over a small candidate pool (cross-encoder or
/// similar). Returns one score per passage, in input order.
///
/// Implementations that call out to a model service must bound the call
/// themselves (request timeout, as the HTTP embedding provider does) and
/// return `Err` on expiry; the engine keeps the fused ordering when a
/// rerank attempt fails.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<f64>>;
}

/// All inputs for one search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    /// Pre-computed query embedding; required whenever the policy scores
    /// the vector signal.
    pub query_embedding: Option<&'a [f32]>,
    /// Model that produced `query_embedding`; chunks embedded under a
    /// different model are excluded from vector comparison.
    pub query_model: &'a str,
    pub top_k: usize,
    pub min_score: f64,
    pub fusion: FusionPolicy,
    pub filters: SearchFilters,
    pub rerank_multiplier: usize,
}

impl<'a> SearchRequest<'a> {
    pub fn new(query: &'a str, query_embedding: Option<&'a [f32]>, query_model: &'a str) -> Self {
        Self {
            query,
            query_embedding,
            query_model,
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            fusion: FusionPolicy::default(),
            filters: SearchFilters::default(),
            rerank_multiplier: DEFAULT_RERANK_MULTIPLIER,
        }
    }
}

/// One scored, cited result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    /// Id of the matching chunk (the child, under hierarchical retrieval).
    pub chunk_id: String,
    pub source_id: String,
    pub chunk_index: i64,
    /// Fused (or reranked) score.
    pub score: f64,
    /// Passage text; the parent's text when the match was a hierarchical
    /// child.
    pub text: String,
    pub document_name: String,
    pub location: String,
    pub page_number: Option<i64>,
    pub section_heading: Option<String>,
    pub source_metadata: serde_json::Value,
}

/// Min-max normalize raw scores to `[0.0, 1.0]`; a constant set maps to
/// `1.0`.
fn normalize_scores(candidates: &[ChunkCandidate]) -> HashMap<String, f64> {
    if candidates.is_empty() {
        return HashMap::new();
    }
    let min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);
    candidates
        .iter()
        .map(|c| {
            let norm = if (max - min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - min) / (max - min)
            };
            (c.chunk_id.clone(), norm)
        })
        .collect()
}

fn rank_map(candidates: &[ChunkCandidate]) -> HashMap<String, usize> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (c.chunk_id.clone(), i + 1))
        .collect()
}

struct Fused {
    candidate: ChunkCandidate,
    score: f64,
}

fn sort_fused(fused: &mut [Fused]) {
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.candidate.chunk_index.cmp(&b.candidate.chunk_index))
            .then_with(|| a.candidate.source_id.cmp(&b.candidate.source_id))
    });
}

/// Run a hybrid search against a [`Store`].
pub async fn search<S: Store + ?Sized>(
    store: &S,
    reranker: Option<&dyn Reranker>,
    req: &SearchRequest<'_>,
) -> Result<Vec<SearchHit>> {
    if req.query.trim().is_empty() && req.query_embedding.is_none() {
        return Ok(Vec::new());
    }
    if req.top_k == 0 {
        return Err(Error::validation("top_k must be >= 1"));
    }

    let fetch_limit = if reranker.is_some() {
        req.top_k * req.rerank_multiplier.max(1)
    } else {
        req.top_k
    };
    let candidate_k = (fetch_limit * 4).max(32);

    // Primary signal: errors propagate. Missing embedding is fatal only
    // for a vector-only policy.
    let vector_candidates = if req.fusion.uses_vector() {
        match req.query_embedding {
            Some(qv) => {
                store
                    .vector_candidates(qv, req.query_model, candidate_k, &req.filters)
                    .await?
            }
            None if req.fusion == FusionPolicy::VectorOnly => {
                return Err(Error::validation(
                    "query embedding is required for vector-only search",
                ));
            }
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    // Auxiliary signals degrade: a failed or slow signal is excluded
    // from fusion rather than failing the query.
    let lexical_candidates = if req.fusion.uses_lexical() {
        match store
            .lexical_candidates(req.query, candidate_k, &req.filters)
            .await
        {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(error = %e, "lexical signal excluded from fusion");
                None
            }
        }
    } else {
        None
    };
    let fuzzy_candidates = if req.fusion.uses_fuzzy() {
        match store
            .fuzzy_candidates(req.query, candidate_k, &req.filters)
            .await
        {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(error = %e, "fuzzy signal excluded from fusion");
                None
            }
        }
    } else {
        None
    };

    // Union of candidates, keyed by chunk id.
    let mut pool: HashMap<String, ChunkCandidate> = HashMap::new();
    for c in vector_candidates
        .iter()
        .chain(lexical_candidates.iter().flatten())
        .chain(fuzzy_candidates.iter().flatten())
    {
        pool.entry(c.chunk_id.clone()).or_insert_with(|| c.clone());
    }
    if pool.is_empty() {
        return Ok(Vec::new());
    }

    let mut fused: Vec<Fused> = match &req.fusion {
        FusionPolicy::VectorOnly => vector_candidates
            .iter()
            .map(|c| Fused {
                candidate: c.clone(),
                score: c.raw_score,
            })
            .collect(),
        FusionPolicy::WeightedSum {
            vector,
            lexical,
            fuzzy,
        } => {
            let vector_scores: HashMap<String, f64> = vector_candidates
                .iter()
                .map(|c| (c.chunk_id.clone(), c.raw_score.clamp(0.0, 1.0)))
                .collect();
            let lexical_scores = lexical_candidates
                .as_deref()
                .map(normalize_scores)
                .unwrap_or_default();
            let fuzzy_scores: HashMap<String, f64> = fuzzy_candidates
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|c| (c.chunk_id.clone(), c.raw_score))
                .collect();

            // Renormalize weights over the signals that are actually
            // present, so a degraded signal does not depress every score.
            let mut total = 0.0;
            if !vector_candidates.is_empty() {
                total += vector;
            }
            if lexical_candidates.is_some() {
                total += lexical;
            }
            if fuzzy_candidates.is_some() {
                total += fuzzy;
            }
            if total <= 0.0 {
                return Ok(Vec::new());
            }

            pool.values()
                .map(|c| {
                    let v = vector_scores.get(&c.chunk_id).copied().unwrap_or(0.0);
                    let l = lexical_scores.get(&c.chunk_id).copied().unwrap_or(0.0);
                    let f = fuzzy_scores.get(&c.chunk_id).copied().unwrap_or(0.0);
                    Fused {
                        candidate: c.clone(),
                        score: (vector * v + lexical * l + fuzzy * f) / total,
                    }
                })
                .collect()
        }
        FusionPolicy::ReciprocalRank { k } => {
            let ranks: Vec<HashMap<String, usize>> = [
                Some(&vector_candidates),
                lexical_candidates.as_ref(),
                fuzzy_candidates.as_ref(),
            ]
            .into_iter()
            .flatten()
            .map(|c| rank_map(c))
            .collect();

            pool.values()
                .map(|c| {
                    let score = ranks
                        .iter()
                        .filter_map(|m| m.get(&c.chunk_id))
                        .map(|rank| 1.0 / (k + *rank as f64))
                        .sum();
                    Fused {
                        candidate: c.clone(),
                        score,
                    }
                })
                .collect()
        }
    };

    fused.retain(|f| f.score >= req.min_score);
    sort_fused(&mut fused);
    fused.truncate(fetch_limit);

    // Optional precision stage over the over-fetched pool.
    if let Some(reranker) = reranker {
        if !fused.is_empty() {
            let passages: Vec<String> = fused.iter().map(|f| f.candidate.text.clone()).collect();
            match reranker.rerank(req.query, &passages).await {
                Ok(scores) if scores.len() == fused.len() => {
                    for (f, s) in fused.iter_mut().zip(scores) {
                        f.score = s;
                    }
                    sort_fused(&mut fused);
                }
                Ok(scores) => {
                    warn!(
                        expected = fused.len(),
                        got = scores.len(),
                        "reranker returned wrong score count; keeping fused order"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "reranker failed; keeping fused order");
                }
            }
        }
    }
    fused.truncate(req.top_k);

    // Citation join + hierarchical parent resolution.
    let mut hits = Vec::with_capacity(fused.len());
    for f in fused {
        let c = f.candidate;
        let Some(source) = store.source_by_id(&c.source_id).await? else {
            warn!(source_id = %c.source_id, "candidate source vanished; dropping hit");
            continue;
        };
        let text = match c.parent_index {
            Some(parent_index) => match store.chunk_by_index(&c.source_id, parent_index).await? {
                Some(parent) => parent.text,
                None => {
                    warn!(
                        source_id = %c.source_id,
                        parent_index,
                        "parent chunk missing; falling back to child text"
                    );
                    c.text
                }
            },
            None => c.text,
        };
        hits.push(SearchHit {
            chunk_id: c.chunk_id,
            source_id: c.source_id,
            chunk_index: c.chunk_index,
            score: f.score,
            text,
            document_name: source.document_name,
            location: source.location,
            page_number: c.page_number,
            section_heading: c.section_heading,
            source_metadata: source.metadata,
        });
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{build_chunks, content_hash, ChunkDraft, Source, SourceStatus};
    use crate::store::memory::InMemoryStore;

    fn source(id: &str, location: &str, model: &str) -> Source {
        Source {
            id: id.into(),
            location: location.into(),
            document_name: format!("doc-{id}"),
            document_type: "text".into(),
            source_type: "upload".into(),
            content_hash: content_hash(location),
            status: SourceStatus::Ready,
            metadata: serde_json::json!({"lang": "en"}),
            error_message: None,
            embedding_model: model.into(),
            created_at: 0,
            updated_at: 0,
        }
    }

    async fn seed(store: &InMemoryStore, src: &Source, rows: Vec<(&str, Vec<f32>)>) {
        store.insert_source(src).await.unwrap();
        let drafts: Vec<ChunkDraft> = rows.iter().map(|(t, _)| ChunkDraft::new(*t)).collect();
        let vectors: Vec<Vec<f32>> = rows.into_iter().map(|(_, v)| v).collect();
        let chunks = build_chunks(src, drafts, vectors).unwrap();
        store.replace_chunks(&src.id, &chunks).await.unwrap();
    }

    #[tokio::test]
    async fn vector_only_orders_by_similarity() {
        let store = InMemoryStore::new();
        let src = source("s1", "/a", "m1");
        seed(
            &store,
            &src,
            vec![
                ("far", vec![0.0, 1.0]),
                ("near", vec![1.0, 0.0]),
                ("mid", vec![0.7, 0.7]),
            ],
        )
        .await;

        let query = [1.0f32, 0.0];
        let req = SearchRequest::new("", Some(&query), "m1");
        let hits = search(&store, None, &req).await.unwrap();
        assert_eq!(hits[0].text, "near");
        assert_eq!(hits[1].text, "mid");
        // "far" scored 0.0, below the 0.2 default floor.
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn min_score_filters_results() {
        let store = InMemoryStore::new();
        let src = source("s1", "/a", "m1");
        seed(
            &store,
            &src,
            vec![("strong", vec![1.0, 0.0]), ("weak", vec![0.6, 0.8])],
        )
        .await;

        let query = [1.0f32, 0.0];
        let mut req = SearchRequest::new("", Some(&query), "m1");
        req.min_score = 0.9;
        let hits = search(&store, None, &req).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.iter().all(|h| h.score >= 0.9));
    }

    #[tokio::test]
    async fn ties_break_by_chunk_index() {
        let store = InMemoryStore::new();
        let src = source("s1", "/a", "m1");
        // Identical vectors -> identical scores.
        seed(
            &store,
            &src,
            vec![
                ("chunk zero", vec![1.0, 0.0]),
                ("chunk one", vec![1.0, 0.0]),
                ("chunk two", vec![1.0, 0.0]),
            ],
        )
        .await;

        let query = [1.0f32, 0.0];
        let req = SearchRequest::new("", Some(&query), "m1");
        for _ in 0..3 {
            let hits = search(&store, None, &req).await.unwrap();
            let order: Vec<i64> = hits.iter().map(|h| h.chunk_index).collect();
            assert_eq!(order, vec![0, 1, 2]);
        }
    }

    #[tokio::test]
    async fn model_mismatch_is_excluded_from_vector_scoring() {
        let store = InMemoryStore::new();
        let a = source("s1", "/a", "model-a");
        let b = source("s2", "/b", "model-b");
        seed(&store, &a, vec![("embedded under a", vec![1.0, 0.0])]).await;
        seed(&store, &b, vec![("embedded under b", vec![1.0, 0.0])]).await;

        let query = [1.0f32, 0.0];
        let req = SearchRequest::new("", Some(&query), "model-b");
        let hits = search(&store, None, &req).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "embedded under b");
    }

    #[tokio::test]
    async fn hybrid_fusion_surfaces_exact_phrase() {
        let store = InMemoryStore::new();
        let src = source("s1", "/report.md", "m1");
        // The target chunk is vector-mediocre but lexically/fuzzily strong.
        seed(
            &store,
            &src,
            vec![
                ("quarterly revenue grew 12%", vec![0.4, 0.9]),
                ("the weather was mild in june", vec![1.0, 0.0]),
                ("annual shareholder meeting notes", vec![0.9, 0.4]),
                ("office relocation planning", vec![0.8, 0.6]),
            ],
        )
        .await;

        let query_vec = [1.0f32, 0.0];
        let mut req = SearchRequest::new("quarterly revenue growth", Some(&query_vec), "m1");
        req.fusion = FusionPolicy::weighted_default();
        req.min_score = 0.0;
        let hits = search(&store, None, &req).await.unwrap();
        let position = hits
            .iter()
            .position(|h| h.text == "quarterly revenue grew 12%")
            .expect("phrase chunk returned");
        assert!(position < 3, "expected top-3, got position {position}");
    }

    #[tokio::test]
    async fn reciprocal_rank_fusion_rewards_presence_in_both_signals() {
        let store = InMemoryStore::new();
        let src = source("s1", "/a", "m1");
        seed(
            &store,
            &src,
            vec![
                ("alpha shared term", vec![0.9, 0.1]),
                ("beta unrelated text", vec![1.0, 0.0]),
            ],
        )
        .await;

        let query_vec = [1.0f32, 0.0];
        let mut req = SearchRequest::new("shared term", Some(&query_vec), "m1");
        req.fusion = FusionPolicy::rrf_default();
        req.min_score = 0.0;
        let hits = search(&store, None, &req).await.unwrap();
        assert_eq!(hits[0].text, "alpha shared term");
    }

    #[tokio::test]
    async fn degraded_lexical_signal_does_not_fail_query() {
        struct FailingLexical(InMemoryStore);

        #[async_trait]
        impl Store for FailingLexical {
            async fn insert_source(&self, s: &Source) -> Result<()> {
                self.0.insert_source(s).await
            }
            async fn update_source(&self, s: &Source) -> Result<()> {
                self.0.update_source(s).await
            }
            async fn source_by_id(&self, id: &str) -> Result<Option<Source>> {
                self.0.source_by_id(id).await
            }
            async fn source_by_location(&self, l: &str) -> Result<Option<Source>> {
                self.0.source_by_location(l).await
            }
            async fn list_sources(&self) -> Result<Vec<Source>> {
                self.0.list_sources().await
            }
            async fn transition_status(
                &self,
                id: &str,
                expected: SourceStatus,
                next: SourceStatus,
                msg: Option<&str>,
            ) -> Result<Source> {
                self.0.transition_status(id, expected, next, msg).await
            }
            async fn count_sources_with_status(&self, s: SourceStatus) -> Result<u64> {
                self.0.count_sources_with_status(s).await
            }
            async fn replace_chunks(
                &self,
                id: &str,
                chunks: &[crate::models::Chunk],
            ) -> Result<()> {
                self.0.replace_chunks(id, chunks).await
            }
            async fn chunks_by_source(&self, id: &str) -> Result<Vec<crate::models::Chunk>> {
                self.0.chunks_by_source(id).await
            }
            async fn chunk_by_index(
                &self,
                id: &str,
                idx: i64,
            ) -> Result<Option<crate::models::Chunk>> {
                self.0.chunk_by_index(id, idx).await
            }
            async fn vector_candidates(
                &self,
                q: &[f32],
                m: &str,
                l: usize,
                f: &SearchFilters,
            ) -> Result<Vec<ChunkCandidate>> {
                self.0.vector_candidates(q, m, l, f).await
            }
            async fn lexical_candidates(
                &self,
                _q: &str,
                _l: usize,
                _f: &SearchFilters,
            ) -> Result<Vec<ChunkCandidate>> {
                Err(Error::store("lexical scoring timed out"))
            }
            async fn fuzzy_candidates(
                &self,
                q: &str,
                l: usize,
                f: &SearchFilters,
            ) -> Result<Vec<ChunkCandidate>> {
                self.0.fuzzy_candidates(q, l, f).await
            }
        }

        let store = FailingLexical(InMemoryStore::new());
        let src = source("s1", "/a", "m1");
        store.insert_source(&src).await.unwrap();
        let chunks = build_chunks(
            &src,
            vec![ChunkDraft::new("quarterly revenue grew 12%")],
            vec![vec![1.0, 0.0]],
        )
        .unwrap();
        store.replace_chunks(&src.id, &chunks).await.unwrap();

        let query_vec = [1.0f32, 0.0];
        let mut req = SearchRequest::new("quarterly revenue", Some(&query_vec), "m1");
        req.fusion = FusionPolicy::weighted_default();
        req.min_score = 0.0;
        let hits = search(&store, None, &req).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn reranker_reorders_overfetched_pool() {
        struct ReverseReranker;

        #[async_trait]
        impl Reranker for ReverseReranker {
            async fn rerank(&self, _query: &str, passages: &[String]) -> Result<Vec<f64>> {
                // Favor the passage the vector signal liked least.
                Ok((0..passages.len()).map(|i| i as f64).collect())
            }
        }

        let store = InMemoryStore::new();
        let src = source("s1", "/a", "m1");
        seed(
            &store,
            &src,
            vec![
                ("first by vector", vec![1.0, 0.0]),
                ("second by vector", vec![0.95, 0.2]),
                ("third by vector", vec![0.9, 0.3]),
            ],
        )
        .await;

        let query_vec = [1.0f32, 0.0];
        let mut req = SearchRequest::new("anything", Some(&query_vec), "m1");
        req.top_k = 1;
        req.min_score = 0.0;
        let hits = search(&store, Some(&ReverseReranker), &req).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "third by vector");
    }

    #[tokio::test]
    async fn failed_reranker_keeps_fused_order() {
        struct UnavailableReranker;

        #[async_trait]
        impl Reranker for UnavailableReranker {
            async fn rerank(&self, _query: &str, _passages: &[String]) -> Result<Vec<f64>> {
                // A provider that timed out or refused the call.
                Err(Error::embedding("rerank service timed out"))
            }
        }

        let store = InMemoryStore::new();
        let src = source("s1", "/a", "m1");
        seed(
            &store,
            &src,
            vec![
                ("first by vector", vec![1.0, 0.0]),
                ("second by vector", vec![0.9, 0.3]),
            ],
        )
        .await;

        let query_vec = [1.0f32, 0.0];
        let mut req = SearchRequest::new("anything", Some(&query_vec), "m1");
        req.min_score = 0.0;
        let hits = search(&store, Some(&UnavailableReranker), &req).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "first by vector");
    }

    #[tokio::test]
    async fn hierarchical_hit_returns_parent_text_with_child_score() {
        let store = InMemoryStore::new();
        let src = source("s1", "/a", "m1");
        store.insert_source(&src).await.unwrap();

        let mut parent = ChunkDraft::new("full parent context with the child sentence inside");
        parent.searchable = false;
        let mut child = ChunkDraft::new("child sentence");
        child.parent_index = Some(0);
        let chunks = build_chunks(&src, vec![parent, child], vec![vec![1.0, 0.0]]).unwrap();
        store.replace_chunks(&src.id, &chunks).await.unwrap();

        let query_vec = [1.0f32, 0.0];
        let req = SearchRequest::new("", Some(&query_vec), "m1");
        let hits = search(&store, None, &req).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_index, 1, "score attributed to the child");
        assert_eq!(
            hits[0].text,
            "full parent context with the child sentence inside"
        );
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn citation_join_carries_source_metadata() {
        let store = InMemoryStore::new();
        let src = source("s1", "/docs/report.md", "m1");
        seed(&store, &src, vec![("cited text", vec![1.0, 0.0])]).await;

        let query_vec = [1.0f32, 0.0];
        let req = SearchRequest::new("", Some(&query_vec), "m1");
        let hits = search(&store, None, &req).await.unwrap();
        assert_eq!(hits[0].document_name, "doc-s1");
        assert_eq!(hits[0].location, "/docs/report.md");
        assert_eq!(hits[0].source_metadata["lang"], "en");
    }

    #[tokio::test]
    async fn empty_query_without_embedding_returns_nothing() {
        let store = InMemoryStore::new();
        let req = SearchRequest::new("   ", None, "m1");
        assert!(search(&store, None, &req).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vector_only_without_embedding_is_a_validation_error() {
        let store = InMemoryStore::new();
        let req = SearchRequest::new("query text", None, "m1");
        assert!(matches!(
            search(&store, None, &req).await.unwrap_err(),
            Error::Validation(_)
        ));
    }
}
