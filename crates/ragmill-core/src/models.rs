//! Core data model: sources, chunks, and the ingestion status machine.
//!
//! A [`Source`] is one registered document; a [`Chunk`] is one retrievable
//! unit derived from it. A source exclusively owns its chunks: the full
//! batch is replaced atomically on re-ingestion and cascade-deleted with
//! the source.
//!
//! The ingestion status is an explicit finite-state machine:
//!
//! ```text
//! pending ──▶ processing ──▶ ready
//!                 │
//!                 └────────▶ error ──(retry)──▶ pending
//! ```
//!
//! Transitions are validated by [`SourceStatus::can_transition`]; stores
//! apply them through a compare-and-swap update, never direct field writes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::projection;

/// Ingestion lifecycle state of a [`Source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Registered, waiting for chunking/embedding to begin.
    Pending,
    /// Chunking/embedding in flight. At most one per source.
    Processing,
    /// Chunks committed; the source serves queries.
    Ready,
    /// Ingestion failed; `error_message` holds the cause.
    Error,
}

impl SourceStatus {
    /// Stable string form used in persisted rows and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Processing => "processing",
            SourceStatus::Ready => "ready",
            SourceStatus::Error => "error",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(SourceStatus::Pending),
            "processing" => Ok(SourceStatus::Processing),
            "ready" => Ok(SourceStatus::Ready),
            "error" => Ok(SourceStatus::Error),
            other => Err(Error::validation(format!("unknown source status: {other}"))),
        }
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// `ready`/`error` never move directly to `processing`; an errored
    /// source must pass through an explicit `retry` back to `pending`.
    pub fn can_transition(&self, next: SourceStatus) -> bool {
        matches!(
            (self, next),
            (SourceStatus::Pending, SourceStatus::Processing)
                | (SourceStatus::Processing, SourceStatus::Ready)
                | (SourceStatus::Processing, SourceStatus::Error)
                | (SourceStatus::Error, SourceStatus::Pending)
        )
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered document-level ingestion unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// UUID string.
    pub id: String,
    /// Unique origin path or URL.
    pub location: String,
    /// Human-readable display name.
    pub document_name: String,
    /// File format or content type (e.g. `"pdf"`, `"markdown"`).
    pub document_type: String,
    /// How the document arrived (e.g. `"upload"`, `"crawl"`).
    pub source_type: String,
    /// SHA-256 over normalized content; drives change detection.
    pub content_hash: String,
    /// Ingestion lifecycle state.
    pub status: SourceStatus,
    /// Open key-value metadata map.
    pub metadata: serde_json::Value,
    /// Set only while `status == Error`.
    pub error_message: Option<String>,
    /// Identifier of the model used for this source's chunk embeddings.
    pub embedding_model: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub updated_at: i64,
}

/// Intake payload for [`crate::registry::register`].
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub location: String,
    pub document_name: String,
    pub document_type: String,
    pub source_type: String,
    /// Raw document content; hashed after normalization.
    pub content: String,
    pub metadata: serde_json::Value,
    /// Model that will embed this source's chunks.
    pub embedding_model: String,
}

/// Normalize raw content before hashing: unify line endings and strip
/// outer whitespace so cosmetic differences do not force re-ingestion.
pub fn normalize_content(content: &str) -> String {
    content.replace("\r\n", "\n").trim().to_string()
}

/// SHA-256 fingerprint over normalized content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_content(content).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A structural block of a normalized document, as emitted by the
/// external parser (pages and headings are optional annotations).
#[derive(Debug, Clone, Default)]
pub struct DocBlock {
    pub text: String,
    pub page_number: Option<i64>,
    pub section_heading: Option<String>,
    pub structural_type: Option<String>,
}

/// Parsed document handed to a chunking strategy: full text plus optional
/// structural annotations.
#[derive(Debug, Clone)]
pub struct NormalizedDocument {
    pub blocks: Vec<DocBlock>,
}

impl NormalizedDocument {
    /// Build a document from plain text, one block per paragraph.
    pub fn from_text(text: &str) -> Self {
        let blocks = normalize_content(text)
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| DocBlock {
                text: p.to_string(),
                ..DocBlock::default()
            })
            .collect();
        Self { blocks }
    }

    /// Build a document from parser-provided blocks.
    pub fn from_blocks(blocks: Vec<DocBlock>) -> Self {
        Self { blocks }
    }

    /// Concatenated block text, paragraph-separated.
    pub fn full_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.text.trim().is_empty())
    }
}

/// Chunk produced by a strategy before projections and identity are
/// attached. `embedding` is populated only by strategies that compute
/// vectors themselves (late chunking); everything else is embedded by the
/// pipeline in one batch.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    pub text: String,
    pub page_number: Option<i64>,
    pub section_heading: Option<String>,
    pub structural_type: Option<String>,
    /// Back-reference to the parent draft's position (hierarchical only).
    pub parent_index: Option<i64>,
    /// Parents are stored for context resolution but never indexed.
    pub searchable: bool,
    pub embedding: Option<Vec<f32>>,
}

impl ChunkDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page_number: None,
            section_heading: None,
            structural_type: None,
            parent_index: None,
            searchable: true,
            embedding: None,
        }
    }
}

/// One retrievable unit of a [`Source`].
///
/// `lexical` and `trigrams` are derived projections of `text`, computed at
/// construction time and kept consistent with it. `(source_id,
/// chunk_index)` is unique; `chunk_index` is dense and zero-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub chunk_index: i64,
    pub page_number: Option<i64>,
    pub structural_type: Option<String>,
    pub section_heading: Option<String>,
    /// Required, non-empty.
    pub text: String,
    /// Lexical-search projection derived from `text`.
    pub lexical: String,
    /// Fuzzy-match trigram projection derived from `text`.
    pub trigrams: String,
    /// Fixed-dimension vector; `None` for hierarchical parents.
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: String,
    /// Parent chunk's `chunk_index` within the same source.
    pub parent_index: Option<i64>,
    /// Excluded from every retrieval signal when false.
    pub searchable: bool,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

/// Materialize drafts into a dense, zero-indexed chunk batch for one
/// source.
///
/// `vectors` supplies embeddings for searchable drafts that did not embed
/// themselves, in draft order. Fails with [`Error::Validation`] on empty
/// draft text and with [`Error::Embedding`] when the vector count does not
/// cover the drafts that need one (all-or-nothing per ingestion attempt).
pub fn build_chunks(
    source: &Source,
    drafts: Vec<ChunkDraft>,
    mut vectors: Vec<Vec<f32>>,
) -> Result<Vec<Chunk>> {
    let needed = drafts
        .iter()
        .filter(|d| d.searchable && d.embedding.is_none())
        .count();
    if vectors.len() != needed {
        return Err(Error::embedding(format!(
            "embedding count mismatch: got {}, expected {}",
            vectors.len(),
            needed
        )));
    }

    let now = chrono::Utc::now().timestamp();
    let mut vectors = vectors.drain(..);
    let mut chunks = Vec::with_capacity(drafts.len());

    for (index, draft) in drafts.into_iter().enumerate() {
        if draft.text.trim().is_empty() {
            return Err(Error::validation(format!(
                "chunk {index} of source {} has empty text",
                source.location
            )));
        }
        let embedding = if draft.searchable {
            match draft.embedding {
                Some(v) => Some(v),
                // count verified above
                None => vectors.next(),
            }
        } else {
            None
        };
        chunks.push(Chunk {
            id: Uuid::new_v4().to_string(),
            source_id: source.id.clone(),
            chunk_index: index as i64,
            page_number: draft.page_number,
            structural_type: draft.structural_type,
            section_heading: draft.section_heading,
            lexical: projection::lexical_projection(&draft.text),
            trigrams: projection::trigram_projection(&draft.text),
            text: draft.text,
            embedding,
            embedding_model: source.embedding_model.clone(),
            parent_index: draft.parent_index,
            searchable: draft.searchable,
            metadata: serde_json::json!({}),
            created_at: now,
        });
    }

    Ok(chunks)
}
