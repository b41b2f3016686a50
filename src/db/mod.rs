//! Chunk store on SQLite: repository records, chunks, an FTS5 projection for
//! lexical lookup, sqlite-vec vectors and extracted symbols.
//!
//! Every pass writes its chunks under a fresh generation number. Readers only
//! see `repositories.current_generation`, which is flipped in the same
//! transaction that records the new commit.
use rusqlite::{Connection, Result, params};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use tracing::{debug, info};

pub mod chunks;
pub mod lexical;
pub mod models;
pub mod repositories;
pub mod symbols;
pub mod vectors;

pub use models::*;
pub use vectors::cosine_similarity;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
    name TEXT PRIMARY KEY,
    last_commit TEXT,
    indexed_at DATETIME,
    total_chunks INTEGER NOT NULL DEFAULT 0,
    current_generation INTEGER NOT NULL DEFAULT 0,
    state TEXT NOT NULL DEFAULT 'not_indexed',
    last_error TEXT
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository TEXT NOT NULL,
    generation INTEGER NOT NULL,
    chunk_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    content TEXT NOT NULL,
    kind TEXT NOT NULL,
    language TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    token_count INTEGER NOT NULL,
    term_freqs TEXT NOT NULL,
    has_embedding INTEGER NOT NULL DEFAULT 0,
    UNIQUE(repository, generation, chunk_id),
    FOREIGN KEY (repository) REFERENCES repositories(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chunks_snapshot ON chunks(repository, generation);
CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(repository, generation, file_path);

CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chunk_rowid INTEGER NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    start_column INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    end_column INTEGER NOT NULL,
    context TEXT NOT NULL,
    FOREIGN KEY (chunk_rowid) REFERENCES chunks(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_symbols_chunk ON symbols(chunk_rowid);
CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    content,
    tokenize = 'unicode61 remove_diacritics 0'
);
"#;

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A SQLite connection initialized with sqlite-vec and the chunk store schema.
pub struct Db {
    pub(crate) conn: Connection,
    dimensions: usize,
}

impl Db {
    /// Open the store at `path`; vectors are `dimensions` wide.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("Initializing database: {}", path.display());

        // Register sqlite-vec extension globally
        init_sqlite_vec();

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn, dimensions)
    }

    /// Open an in-memory database connection (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        debug!("sqlite-vec version: {}", vec_version);

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(embedding FLOAT[{dimensions}]);"
        ))?;

        Ok(Self { conn, dimensions })
    }

    /// Width of stored vectors.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Delete a repository's chunk rows selected by `generation_filter`
/// (`= ?2` or `!= ?2`), including their FTS and vector projections.
/// Symbols go with their chunks through the foreign key.
pub(crate) fn purge_chunks(
    conn: &Connection,
    repository: &str,
    generation: i64,
    generation_filter: &str,
) -> Result<usize> {
    let selector = format!(
        "SELECT id FROM chunks WHERE repository = ?1 AND generation {generation_filter} ?2"
    );

    // Virtual tables do not take part in cascades
    conn.execute(
        &format!("DELETE FROM vec_chunks WHERE rowid IN ({selector})"),
        params![repository, generation],
    )?;
    conn.execute(
        &format!("DELETE FROM chunks_fts WHERE rowid IN ({selector})"),
        params![repository, generation],
    )?;
    conn.execute(
        &format!("DELETE FROM chunks WHERE repository = ?1 AND generation {generation_filter} ?2"),
        params![repository, generation],
    )
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Inverse of [`serialize_vector`]; trailing partial floats are ignored.
pub fn deserialize_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Placeholder list `?, ?, ...` for an `IN` clause.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
