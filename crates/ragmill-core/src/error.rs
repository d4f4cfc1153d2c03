//! Error taxonomy shared by the ingestion and retrieval paths.
//!
//! Every fallible core operation returns [`Result`]. The variants map to
//! distinct caller obligations:
//!
//! | Variant | Meaning | Caller response |
//! |---------|---------|-----------------|
//! | [`Error::Validation`] | Malformed input, rejected before any state change | Fix the input |
//! | [`Error::InvalidState`] | Illegal status transition | Inspect current state, do not retry blindly |
//! | [`Error::Embedding`] | Upstream embedding failure or timeout | Ingestion aborts; source is marked `error` |
//! | [`Error::Store`] | Persistence failure; store rolled back to pre-call state | Source is marked `error` |
//! | [`Error::NotReady`] | Query attempted with no `ready` sources | Ingest first; not retried automatically |

use crate::models::SourceStatus;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by registry, chunking, embedding, store, and search
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed intake (empty location, empty chunk text, bad parameters).
    /// Raised before any state change.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An illegal status transition was attempted. The transition guard
    /// doubles as the per-source ingestion mutex, so concurrent
    /// `begin_processing` calls surface here.
    #[error("invalid status transition for source {source_id}: {current} -> {requested}")]
    InvalidState {
        source_id: String,
        current: SourceStatus,
        requested: SourceStatus,
    },

    /// Upstream embedding call failed or timed out. Chunks from the
    /// affected batch are never partially persisted.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Persistence failure. `replace_chunks` guarantees rollback to the
    /// pre-call state, so no partial chunk set is ever visible.
    #[error("store operation failed: {0}")]
    Store(String),

    /// A query was attempted while no source is in `ready` status.
    #[error("no sources are ready for retrieval")]
    NotReady,
}

impl Error {
    /// Wrap a backend failure as a [`Error::Store`].
    pub fn store(err: impl std::fmt::Display) -> Self {
        Error::Store(err.to_string())
    }

    /// Wrap an upstream embedding failure as a [`Error::Embedding`].
    pub fn embedding(err: impl std::fmt::Display) -> Self {
        Error::Embedding(err.to_string())
    }

    /// Build a [`Error::Validation`] from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}
