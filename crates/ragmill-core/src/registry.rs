//! Source registry: document-level metadata and the ingestion lifecycle.
//!
//! Registration is hash-driven: re-registering a location whose content
//! hashes identically is a no-op (status and chunks untouched); a changed
//! hash resets the source to `pending` for replacement ingestion.
//!
//! The status operations delegate to the store's compare-and-swap
//! transition, so [`begin_processing`] doubles as the per-source mutex:
//! at most one ingestion per source is in flight, and a losing caller gets
//! [`Error::InvalidState`] rather than blocking.

use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{content_hash, RegisterRequest, Source, SourceStatus};
use crate::store::Store;

/// Register a document, returning the source row and whether new chunking
/// work is needed.
///
/// Fails with [`Error::Validation`] on an empty location or empty content
/// before any state change.
pub async fn register<S: Store + ?Sized>(
    store: &S,
    request: RegisterRequest,
) -> Result<(Source, bool)> {
    if request.location.trim().is_empty() {
        return Err(Error::validation("source location must not be empty"));
    }
    if request.content.trim().is_empty() {
        return Err(Error::validation(format!(
            "source {} has empty content",
            request.location
        )));
    }

    let hash = content_hash(&request.content);
    let now = chrono::Utc::now().timestamp();

    if let Some(existing) = store.source_by_location(&request.location).await? {
        if existing.content_hash == hash {
            info!(location = %existing.location, "source unchanged, skipping");
            return Ok((existing, false));
        }
        let updated = Source {
            id: existing.id,
            location: request.location,
            document_name: request.document_name,
            document_type: request.document_type,
            source_type: request.source_type,
            content_hash: hash,
            status: SourceStatus::Pending,
            metadata: request.metadata,
            error_message: None,
            embedding_model: request.embedding_model,
            created_at: existing.created_at,
            updated_at: now,
        };
        store.update_source(&updated).await?;
        info!(location = %updated.location, "source content changed, re-queued");
        return Ok((updated, true));
    }

    let source = Source {
        id: Uuid::new_v4().to_string(),
        location: request.location,
        document_name: request.document_name,
        document_type: request.document_type,
        source_type: request.source_type,
        content_hash: hash,
        status: SourceStatus::Pending,
        metadata: request.metadata,
        error_message: None,
        embedding_model: request.embedding_model,
        created_at: now,
        updated_at: now,
    };
    store.insert_source(&source).await?;
    info!(location = %source.location, "source registered");
    Ok((source, true))
}

/// `pending -> processing`. Fails with [`Error::InvalidState`] from any
/// other state, including an already-processing source.
pub async fn begin_processing<S: Store + ?Sized>(store: &S, source_id: &str) -> Result<Source> {
    store
        .transition_status(
            source_id,
            SourceStatus::Pending,
            SourceStatus::Processing,
            None,
        )
        .await
}

/// `processing -> ready`.
pub async fn mark_ready<S: Store + ?Sized>(store: &S, source_id: &str) -> Result<Source> {
    store
        .transition_status(
            source_id,
            SourceStatus::Processing,
            SourceStatus::Ready,
            None,
        )
        .await
}

/// `processing -> error`, recording the failure on the source row so
/// operators can inspect it without re-running.
pub async fn mark_error<S: Store + ?Sized>(
    store: &S,
    source_id: &str,
    message: &str,
) -> Result<Source> {
    store
        .transition_status(
            source_id,
            SourceStatus::Processing,
            SourceStatus::Error,
            Some(message),
        )
        .await
}

/// `error -> pending`; the only way out of the error state.
pub async fn retry<S: Store + ?Sized>(store: &S, source_id: &str) -> Result<Source> {
    store
        .transition_status(source_id, SourceStatus::Error, SourceStatus::Pending, None)
        .await
}

/// Operator override: requeue a source whose content hash is unchanged
/// (forced re-ingestion). Resets the row to `pending` and clears any
/// error, regardless of current status.
pub async fn force_requeue<S: Store + ?Sized>(store: &S, source: &Source) -> Result<Source> {
    let requeued = Source {
        status: SourceStatus::Pending,
        error_message: None,
        updated_at: chrono::Utc::now().timestamp(),
        ..source.clone()
    };
    store.update_source(&requeued).await?;
    Ok(requeued)
}
