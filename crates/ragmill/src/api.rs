//! Retrieval façade: the one call sites use to get cited passages.
//!
//! Wraps the query engine with the readiness check and query embedding,
//! and shapes results into serializable passages with citations.

use serde::Serialize;

use ragmill_core::embedding::Embedder;
use ragmill_core::models::SourceStatus;
use ragmill_core::search::{self, FusionPolicy, Reranker, SearchRequest};
use ragmill_core::store::{SearchFilters, Store};
use ragmill_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub min_score: f64,
    pub fusion: FusionPolicy,
    pub filters: SearchFilters,
    pub rerank_multiplier: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: search::DEFAULT_TOP_K,
            min_score: search::DEFAULT_MIN_SCORE,
            fusion: FusionPolicy::default(),
            filters: SearchFilters::default(),
            rerank_multiplier: search::DEFAULT_RERANK_MULTIPLIER,
        }
    }
}

/// Where a passage came from, for attribution in answers.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub chunk_id: String,
    pub document_name: String,
    pub location: String,
    pub chunk_index: i64,
    pub page_number: Option<i64>,
    pub section_heading: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    pub text: String,
    pub score: f64,
    pub citation: Citation,
    pub source_metadata: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub passages: Vec<Passage>,
}

/// Answer a retrieval query.
///
/// Fails with [`Error::NotReady`] when no source has finished ingestion;
/// an empty result from a ready corpus is an empty passage list, not an
/// error.
pub async fn query<S: Store + ?Sized>(
    store: &S,
    embedder: Option<&dyn Embedder>,
    reranker: Option<&dyn Reranker>,
    query_text: &str,
    options: &QueryOptions,
) -> Result<QueryResponse> {
    if query_text.trim().is_empty() {
        return Err(Error::validation("query must not be empty"));
    }
    if store
        .count_sources_with_status(SourceStatus::Ready)
        .await?
        == 0
    {
        return Err(Error::NotReady);
    }

    let (query_embedding, query_model) = match embedder {
        Some(embedder) => {
            let mut vectors = embedder.embed_batch(&[query_text.to_string()]).await?;
            let vector = vectors
                .pop()
                .ok_or_else(|| Error::embedding("empty embedding response"))?;
            (Some(vector), embedder.model_id().to_string())
        }
        None => (None, String::new()),
    };

    let request = SearchRequest {
        query: query_text,
        query_embedding: query_embedding.as_deref(),
        query_model: &query_model,
        top_k: options.top_k,
        min_score: options.min_score,
        fusion: options.fusion.clone(),
        filters: options.filters.clone(),
        rerank_multiplier: options.rerank_multiplier,
    };
    let hits = search::search(store, reranker, &request).await?;

    Ok(QueryResponse {
        query: query_text.to_string(),
        passages: hits
            .into_iter()
            .map(|hit| Passage {
                text: hit.text,
                score: hit.score,
                citation: Citation {
                    chunk_id: hit.chunk_id,
                    document_name: hit.document_name,
                    location: hit.location,
                    chunk_index: hit.chunk_index,
                    page_number: hit.page_number,
                    section_heading: hit.section_heading,
                },
                source_metadata: hit.source_metadata,
            })
            .collect(),
    })
}
