//! # Ragmill Core
//!
//! Backend-agnostic logic for Ragmill: data models, the source registry
//! state machine, chunking strategies, derived search projections, the
//! embedding traits, store abstraction, and the hybrid query engine.
//!
//! This crate performs no I/O of its own. Persistence and network
//! embedding providers live in the application crate behind the
//! [`store::Store`] and [`embedding::Embedder`] traits; the in-memory
//! store here backs the test suite.

pub mod chunker;
pub mod embedding;
pub mod error;
pub mod models;
pub mod projection;
pub mod registry;
pub mod search;
pub mod store;

pub use error::{Error, Result};
