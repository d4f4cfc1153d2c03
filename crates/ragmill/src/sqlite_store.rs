//! SQLite-backed [`Store`] implementation.
//!
//! Persists sources and chunks in the schema created by
//! [`crate::migrate`]. The lexical signal is served by the `chunks_fts`
//! FTS5 table over the stored lexical projection; the vector and fuzzy
//! signals are brute-force scans scored in Rust, which is adequate at the
//! corpus sizes a single SQLite file holds.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use ragmill_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use ragmill_core::models::{Chunk, Source, SourceStatus};
use ragmill_core::projection::{parse_trigram_projection, tokenize, trigram_set, trigram_similarity};
use ragmill_core::store::{ChunkCandidate, SearchFilters, Store};
use ragmill_core::{Error, Result};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_source(row: &sqlx::sqlite::SqliteRow) -> Result<Source> {
    let status: String = row.get("status");
    let metadata_json: String = row.get("metadata_json");
    Ok(Source {
        id: row.get("id"),
        location: row.get("location"),
        document_name: row.get("document_name"),
        document_type: row.get("document_type"),
        source_type: row.get("source_type"),
        content_hash: row.get("content_hash"),
        status: SourceStatus::parse(&status)?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
        error_message: row.get("error_message"),
        embedding_model: row.get("embedding_model"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let embedding: Option<Vec<u8>> = row.get("embedding");
    let metadata_json: String = row.get("metadata_json");
    let searchable: i64 = row.get("searchable");
    Chunk {
        id: row.get("id"),
        source_id: row.get("source_id"),
        chunk_index: row.get("chunk_index"),
        page_number: row.get("page_number"),
        structural_type: row.get("structural_type"),
        section_heading: row.get("section_heading"),
        text: row.get("text"),
        lexical: row.get("lexical"),
        trigrams: row.get("trigrams"),
        embedding: embedding.map(|b| blob_to_vec(&b)),
        embedding_model: row.get("embedding_model"),
        parent_index: row.get("parent_index"),
        searchable: searchable != 0,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
        created_at: row.get("created_at"),
    }
}

/// Build a safe FTS5 MATCH expression from free text: each alphanumeric
/// term quoted, joined by OR. Returns `None` for queries with no terms.
fn fts_match_expr(query: &str) -> Option<String> {
    let terms = tokenize(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

fn candidate_from_row(row: &sqlx::sqlite::SqliteRow, raw_score: f64) -> ChunkCandidate {
    ChunkCandidate {
        chunk_id: row.get("id"),
        source_id: row.get("source_id"),
        chunk_index: row.get("chunk_index"),
        parent_index: row.get("parent_index"),
        text: row.get("text"),
        page_number: row.get("page_number"),
        section_heading: row.get("section_heading"),
        raw_score,
    }
}

fn sort_candidates(candidates: &mut [ChunkCandidate]) {
    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
}

const CANDIDATE_COLUMNS: &str = "c.id, c.source_id, c.chunk_index, c.parent_index, c.text, \
     c.page_number, c.section_heading";

const FILTER_CLAUSE: &str = "(? IS NULL OR s.document_type = ?) AND (? IS NULL OR s.source_type = ?)";

#[async_trait]
impl Store for SqliteStore {
    async fn insert_source(&self, source: &Source) -> Result<()> {
        let metadata = serde_json::to_string(&source.metadata).map_err(Error::store)?;
        sqlx::query(
            r#"
            INSERT INTO sources (id, location, document_name, document_type, source_type,
                                 content_hash, status, metadata_json, error_message,
                                 embedding_model, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source.id)
        .bind(&source.location)
        .bind(&source.document_name)
        .bind(&source.document_type)
        .bind(&source.source_type)
        .bind(&source.content_hash)
        .bind(source.status.as_str())
        .bind(&metadata)
        .bind(&source.error_message)
        .bind(&source.embedding_model)
        .bind(source.created_at)
        .bind(source.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        Ok(())
    }

    async fn update_source(&self, source: &Source) -> Result<()> {
        let metadata = serde_json::to_string(&source.metadata).map_err(Error::store)?;
        let result = sqlx::query(
            r#"
            UPDATE sources SET location = ?, document_name = ?, document_type = ?,
                source_type = ?, content_hash = ?, status = ?, metadata_json = ?,
                error_message = ?, embedding_model = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&source.location)
        .bind(&source.document_name)
        .bind(&source.document_type)
        .bind(&source.source_type)
        .bind(&source.content_hash)
        .bind(source.status.as_str())
        .bind(&metadata)
        .bind(&source.error_message)
        .bind(&source.embedding_model)
        .bind(source.updated_at)
        .bind(&source.id)
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;
        if result.rows_affected() == 0 {
            return Err(Error::store(format!("unknown source: {}", source.id)));
        }
        Ok(())
    }

    async fn source_by_id(&self, id: &str) -> Result<Option<Source>> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        row.as_ref().map(row_to_source).transpose()
    }

    async fn source_by_location(&self, location: &str) -> Result<Option<Source>> {
        let row = sqlx::query("SELECT * FROM sources WHERE location = ?")
            .bind(location)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        row.as_ref().map(row_to_source).transpose()
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query("SELECT * FROM sources ORDER BY location ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::store)?;
        rows.iter().map(row_to_source).collect()
    }

    async fn transition_status(
        &self,
        source_id: &str,
        expected: SourceStatus,
        next: SourceStatus,
        error_message: Option<&str>,
    ) -> Result<Source> {
        if !expected.can_transition(next) {
            return Err(Error::InvalidState {
                source_id: source_id.to_string(),
                current: expected,
                requested: next,
            });
        }

        let message = if next == SourceStatus::Error {
            error_message
        } else {
            None
        };
        let now = chrono::Utc::now().timestamp();

        // The WHERE status guard makes this a compare-and-swap: a
        // concurrent transition wins the race and this call fails.
        let result = sqlx::query(
            "UPDATE sources SET status = ?, error_message = ?, updated_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(message)
        .bind(now)
        .bind(source_id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::store)?;

        if result.rows_affected() == 0 {
            let current = self
                .source_by_id(source_id)
                .await?
                .ok_or_else(|| Error::store(format!("unknown source: {source_id}")))?;
            return Err(Error::InvalidState {
                source_id: source_id.to_string(),
                current: current.status,
                requested: next,
            });
        }

        self.source_by_id(source_id)
            .await?
            .ok_or_else(|| Error::store(format!("unknown source: {source_id}")))
    }

    async fn count_sources_with_status(&self, status: SourceStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(count as u64)
    }

    async fn replace_chunks(&self, source_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for chunk in chunks {
            if chunk.source_id != source_id {
                return Err(Error::validation(format!(
                    "chunk {} belongs to source {}, not {}",
                    chunk.id, chunk.source_id, source_id
                )));
            }
            if !seen.insert(chunk.chunk_index) {
                return Err(Error::validation(format!(
                    "duplicate chunk_index {} for source {}",
                    chunk.chunk_index, source_id
                )));
            }
        }

        // BEGIN IMMEDIATE takes the write lock up front so concurrent writers
        // wait on the busy timeout instead of failing a mid-transaction
        // read-to-write upgrade with SQLITE_BUSY.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(Error::store)?;

        sqlx::query("DELETE FROM chunks_fts WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;

        sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;

        for chunk in chunks {
            let metadata = serde_json::to_string(&chunk.metadata).map_err(Error::store)?;
            let blob = chunk.embedding.as_deref().map(vec_to_blob);
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_id, chunk_index, page_number, structural_type,
                                    section_heading, text, lexical, trigrams, embedding,
                                    embedding_model, parent_index, searchable, metadata_json,
                                    created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source_id)
            .bind(chunk.chunk_index)
            .bind(chunk.page_number)
            .bind(&chunk.structural_type)
            .bind(&chunk.section_heading)
            .bind(&chunk.text)
            .bind(&chunk.lexical)
            .bind(&chunk.trigrams)
            .bind(&blob)
            .bind(&chunk.embedding_model)
            .bind(chunk.parent_index)
            .bind(chunk.searchable as i64)
            .bind(&metadata)
            .bind(chunk.created_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?;

            if chunk.searchable {
                sqlx::query("INSERT INTO chunks_fts (chunk_id, source_id, lexical) VALUES (?, ?, ?)")
                    .bind(&chunk.id)
                    .bind(&chunk.source_id)
                    .bind(&chunk.lexical)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::store)?;
            }
        }

        tx.commit().await.map_err(Error::store)?;
        Ok(())
    }

    async fn chunks_by_source(&self, source_id: &str) -> Result<Vec<Chunk>> {
        let rows =
            sqlx::query("SELECT * FROM chunks WHERE source_id = ? ORDER BY chunk_index ASC")
                .bind(source_id)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::store)?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn chunk_by_index(&self, source_id: &str, chunk_index: i64) -> Result<Option<Chunk>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE source_id = ? AND chunk_index = ?")
            .bind(source_id)
            .bind(chunk_index)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)?;
        Ok(row.as_ref().map(row_to_chunk))
    }

    async fn vector_candidates(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkCandidate>> {
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS}, c.embedding AS vec \
             FROM chunks c JOIN sources s ON s.id = c.source_id \
             WHERE c.searchable = 1 AND c.embedding IS NOT NULL \
               AND c.embedding_model = ? AND {FILTER_CLAUSE}"
        );
        let rows = sqlx::query(&sql)
            .bind(model)
            .bind(&filters.document_type)
            .bind(&filters.document_type)
            .bind(&filters.source_type)
            .bind(&filters.source_type)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::store)?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vec");
                let vec = blob_to_vec(&blob);
                candidate_from_row(row, cosine_similarity(query_vec, &vec) as f64)
            })
            .collect();

        sort_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn lexical_candidates(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkCandidate>> {
        let Some(expr) = fts_match_expr(query) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS}, f.rank AS rank \
             FROM chunks_fts f \
             JOIN chunks c ON c.id = f.chunk_id \
             JOIN sources s ON s.id = c.source_id \
             WHERE f.lexical MATCH ? AND c.searchable = 1 AND {FILTER_CLAUSE} \
             ORDER BY f.rank LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(&expr)
            .bind(&filters.document_type)
            .bind(&filters.document_type)
            .bind(&filters.source_type)
            .bind(&filters.source_type)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::store)?;

        // BM25 ranks are negative-better; negate so higher means closer.
        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                candidate_from_row(row, -rank)
            })
            .collect())
    }

    async fn fuzzy_candidates(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkCandidate>> {
        let query_trigrams = trigram_set(query);
        if query_trigrams.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS}, c.trigrams AS trigrams \
             FROM chunks c JOIN sources s ON s.id = c.source_id \
             WHERE c.searchable = 1 AND {FILTER_CLAUSE}"
        );
        let rows = sqlx::query(&sql)
            .bind(&filters.document_type)
            .bind(&filters.document_type)
            .bind(&filters.source_type)
            .bind(&filters.source_type)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::store)?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .filter_map(|row| {
                let stored: String = row.get("trigrams");
                let similarity =
                    trigram_similarity(&query_trigrams, &parse_trigram_projection(&stored));
                if similarity > 0.0 {
                    Some(candidate_from_row(row, similarity))
                } else {
                    None
                }
            })
            .collect();

        sort_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }
}
