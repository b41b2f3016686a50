//! # coderank: repository code search
//!
//! Turns a checked-out source tree into a persistent, incrementally updated
//! index of searchable chunks, and answers natural-language task queries with
//! a ranked list of chunks fused from lexical, vector and structural signals.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading, validation, and defaults
//! - **[`db`]**: SQLite store: repository records, chunks, FTS5 lexical index, sqlite-vec vectors, symbols
//! - **[`embedder`]**: Embedding provider trait, deterministic mock, optional ONNX model
//! - **[`indexer`]**: Pattern-based chunking per language family and the write path
//! - **[`search`]**: Query analysis, three-way fusion, boost rules, context rendering
//! - **[`source`]**: Source provider trait (git and mock implementations)

pub mod config;
pub mod db;
pub mod embedder;
pub mod error;
pub mod indexer;
pub mod search;
pub mod source;
pub mod types;

pub use error::{IndexError, Result};
pub use indexer::core::{IndexReport, Indexer, IndexerConfig};
pub use search::engine::{QueryEngine, SearchResult};
