//! SQLite store behavior that the in-memory reference cannot cover:
//! schema, transactions, FTS5, and the compare-and-swap guard against a
//! real database file.

use std::path::PathBuf;

use ragmill::db;
use ragmill::migrate;
use ragmill::sqlite_store::SqliteStore;
use ragmill_core::models::{
    build_chunks, content_hash, ChunkDraft, Source, SourceStatus,
};
use ragmill_core::store::{SearchFilters, Store};
use ragmill_core::Error;
use tempfile::TempDir;

async fn open_store(tmp: &TempDir) -> SqliteStore {
    let path: PathBuf = tmp.path().join("rml.sqlite");
    let pool = db::connect(&path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    SqliteStore::new(pool)
}

fn source(id: &str, location: &str) -> Source {
    Source {
        id: id.into(),
        location: location.into(),
        document_name: format!("doc-{id}"),
        document_type: "markdown".into(),
        source_type: "filesystem".into(),
        content_hash: content_hash(location),
        status: SourceStatus::Pending,
        metadata: serde_json::json!({"lang": "en"}),
        error_message: None,
        embedding_model: "hashed-4".into(),
        created_at: 100,
        updated_at: 100,
    }
}

async fn seed_ready(store: &SqliteStore, src: &mut Source, rows: Vec<(&str, Vec<f32>)>) {
    store.insert_source(src).await.unwrap();
    store
        .transition_status(&src.id, SourceStatus::Pending, SourceStatus::Processing, None)
        .await
        .unwrap();
    let drafts: Vec<ChunkDraft> = rows.iter().map(|(t, _)| ChunkDraft::new(*t)).collect();
    let vectors: Vec<Vec<f32>> = rows.into_iter().map(|(_, v)| v).collect();
    let chunks = build_chunks(src, drafts, vectors).unwrap();
    store.replace_chunks(&src.id, &chunks).await.unwrap();
    *src = store
        .transition_status(&src.id, SourceStatus::Processing, SourceStatus::Ready, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn source_round_trip_preserves_fields() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let src = source("s1", "/docs/a.md");
    store.insert_source(&src).await.unwrap();

    let loaded = store.source_by_location("/docs/a.md").await.unwrap().unwrap();
    assert_eq!(loaded.id, "s1");
    assert_eq!(loaded.status, SourceStatus::Pending);
    assert_eq!(loaded.metadata["lang"], "en");
    assert_eq!(loaded.content_hash, src.content_hash);
}

#[tokio::test]
async fn transition_cas_rejects_stale_expectation() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let src = source("s1", "/docs/a.md");
    store.insert_source(&src).await.unwrap();

    store
        .transition_status("s1", SourceStatus::Pending, SourceStatus::Processing, None)
        .await
        .unwrap();

    // A second claimer with the stale expectation loses.
    let err = store
        .transition_status("s1", SourceStatus::Pending, SourceStatus::Processing, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            current: SourceStatus::Processing,
            ..
        }
    ));
}

#[tokio::test]
async fn error_message_is_stored_and_cleared() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let src = source("s1", "/docs/a.md");
    store.insert_source(&src).await.unwrap();

    store
        .transition_status("s1", SourceStatus::Pending, SourceStatus::Processing, None)
        .await
        .unwrap();
    let errored = store
        .transition_status(
            "s1",
            SourceStatus::Processing,
            SourceStatus::Error,
            Some("embedding timed out after 120s"),
        )
        .await
        .unwrap();
    assert_eq!(
        errored.error_message.as_deref(),
        Some("embedding timed out after 120s")
    );

    let requeued = store
        .transition_status("s1", SourceStatus::Error, SourceStatus::Pending, None)
        .await
        .unwrap();
    assert!(requeued.error_message.is_none());
}

#[tokio::test]
async fn replace_chunks_is_atomic_on_duplicate_index() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let mut src = source("s1", "/docs/a.md");
    seed_ready(
        &store,
        &mut src,
        vec![("original chunk", vec![1.0, 0.0, 0.0, 0.0])],
    )
    .await;

    let drafts = vec![ChunkDraft::new("new one"), ChunkDraft::new("new two")];
    let mut chunks = build_chunks(
        &src,
        drafts,
        vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
    )
    .unwrap();
    chunks[1].chunk_index = 0; // collide

    let err = store.replace_chunks(&src.id, &chunks).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // Old chunk set is untouched.
    let kept = store.chunks_by_source(&src.id).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].text, "original chunk");
}

#[tokio::test]
async fn lexical_candidates_use_fts_and_survive_odd_queries() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let mut src = source("s1", "/docs/a.md");
    seed_ready(
        &store,
        &mut src,
        vec![
            ("quarterly revenue grew 12%", vec![1.0, 0.0, 0.0, 0.0]),
            ("kubernetes deployment guide", vec![0.0, 1.0, 0.0, 0.0]),
        ],
    )
    .await;

    let filters = SearchFilters::default();
    let hits = store
        .lexical_candidates("quarterly revenue", 10, &filters)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].text.contains("revenue"));

    // Quotes and operators in raw queries must not break FTS parsing.
    let hits = store
        .lexical_candidates("\"revenue\" AND (grew OR", 10, &filters)
        .await
        .unwrap();
    assert!(!hits.is_empty());

    let none = store.lexical_candidates("???", 10, &filters).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn fuzzy_candidates_tolerate_misspelling() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let mut src = source("s1", "/docs/a.md");
    seed_ready(
        &store,
        &mut src,
        vec![
            ("quarterly revenue grew", vec![1.0, 0.0, 0.0, 0.0]),
            ("weather report for june", vec![0.0, 1.0, 0.0, 0.0]),
        ],
    )
    .await;

    let hits = store
        .fuzzy_candidates("quartely revenu", 10, &SearchFilters::default())
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0].text.contains("quarterly"));
}

#[tokio::test]
async fn vector_candidates_exclude_other_models_and_parents() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let mut a = source("s1", "/docs/a.md");
    seed_ready(&store, &mut a, vec![("model a chunk", vec![1.0, 0.0, 0.0, 0.0])]).await;

    let mut b = source("s2", "/docs/b.md");
    b.embedding_model = "other-model".into();
    seed_ready(&store, &mut b, vec![("model b chunk", vec![1.0, 0.0, 0.0, 0.0])]).await;

    let query = [1.0f32, 0.0, 0.0, 0.0];
    let hits = store
        .vector_candidates(&query, "hashed-4", 10, &SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_id, "s1");
}

#[tokio::test]
async fn filters_restrict_by_source_attributes() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let mut a = source("s1", "/docs/a.md");
    seed_ready(&store, &mut a, vec![("shared terms here", vec![1.0, 0.0, 0.0, 0.0])]).await;

    let mut b = source("s2", "/docs/b.pdf");
    b.document_type = "pdf".into();
    seed_ready(&store, &mut b, vec![("shared terms here", vec![1.0, 0.0, 0.0, 0.0])]).await;

    let filters = SearchFilters {
        document_type: Some("pdf".into()),
        source_type: None,
    };
    let query = [1.0f32, 0.0, 0.0, 0.0];
    let hits = store
        .vector_candidates(&query, "hashed-4", 10, &filters)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_id, "s2");

    let hits = store
        .lexical_candidates("shared terms", 10, &filters)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_id, "s2");
}

#[tokio::test]
async fn unsearchable_parents_are_invisible_to_signals_but_resolvable() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let mut src = source("s1", "/docs/a.md");
    store.insert_source(&src).await.unwrap();
    store
        .transition_status(&src.id, SourceStatus::Pending, SourceStatus::Processing, None)
        .await
        .unwrap();

    let mut parent = ChunkDraft::new("full parent context with details");
    parent.searchable = false;
    let mut child = ChunkDraft::new("details");
    child.parent_index = Some(0);
    let chunks = build_chunks(&src, vec![parent, child], vec![vec![1.0, 0.0, 0.0, 0.0]]).unwrap();
    store.replace_chunks(&src.id, &chunks).await.unwrap();
    src = store
        .transition_status(&src.id, SourceStatus::Processing, SourceStatus::Ready, None)
        .await
        .unwrap();

    let query = [1.0f32, 0.0, 0.0, 0.0];
    let hits = store
        .vector_candidates(&query, "hashed-4", 10, &SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_index, 1);

    let lexical = store
        .lexical_candidates("parent context", 10, &SearchFilters::default())
        .await
        .unwrap();
    assert!(lexical.is_empty());

    let parent = store.chunk_by_index(&src.id, 0).await.unwrap().unwrap();
    assert_eq!(parent.text, "full parent context with details");
}
