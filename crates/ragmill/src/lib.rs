//! # Ragmill
//!
//! Application layer over [`ragmill_core`]: TOML configuration, the
//! SQLite store, embedding providers, the ingestion pipeline, and the
//! retrieval façade consumed by the `rml` binary and integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod migrate;
pub mod sources;
pub mod sqlite_store;
