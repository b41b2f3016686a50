use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Chunk, Symbol};

/// Lifecycle of a repository's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    NotIndexed,
    Indexing,
    Indexed,
    Failed,
}

impl IndexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexState::NotIndexed => "not_indexed",
            IndexState::Indexing => "indexing",
            IndexState::Indexed => "indexed",
            IndexState::Failed => "failed",
        }
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_indexed" => Ok(IndexState::NotIndexed),
            "indexing" => Ok(IndexState::Indexing),
            "indexed" => Ok(IndexState::Indexed),
            "failed" => Ok(IndexState::Failed),
            other => Err(format!("unknown index state: {other}")),
        }
    }
}

/// Persisted per-repository record.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryRecord {
    pub name: String,
    pub last_commit: Option<String>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub total_chunks: usize,
    /// Generation readers see; 0 until the first pass commits.
    pub current_generation: i64,
    pub state: IndexState,
    pub last_error: Option<String>,
}

impl RepositoryRecord {
    /// Whether a committed snapshot exists for this repository.
    pub fn has_snapshot(&self) -> bool {
        self.current_generation > 0
    }
}

/// A chunk as read back from the store, with its row id.
#[derive(Debug, Clone, Serialize)]
pub struct StoredChunk {
    #[serde(skip)]
    pub rowid: i64,
    #[serde(flatten)]
    pub chunk: Chunk,
    #[serde(skip)]
    pub has_embedding: bool,
}

/// Summary of a repository's current snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub repository: String,
    pub total_chunks: usize,
    pub total_symbols: usize,
    pub chunks_with_embedding: usize,
    pub last_indexed: Option<DateTime<Utc>>,
    pub last_commit: Option<String>,
    pub by_kind: BTreeMap<String, usize>,
    pub by_language: BTreeMap<String, usize>,
}

/// BM25 hit from the lexical index.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub rowid: i64,
    pub score: f64,
    pub matched_terms: Vec<String>,
}

/// Cosine hit from the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub rowid: i64,
    pub similarity: f32,
}

/// A stored symbol that matched a structural prefilter.
#[derive(Debug, Clone)]
pub struct SymbolRow {
    pub chunk_rowid: i64,
    pub symbol: Symbol,
}
