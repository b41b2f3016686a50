use super::{Db, models::*, placeholders, serialize_vector};
use crate::types::{Chunk, ChunkKind, EmbeddedChunk, Symbol, SymbolKind};
use rusqlite::types::{Type, Value};
use rusqlite::{Result, Row, params};
use std::collections::{BTreeMap, HashMap};

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn map_chunk(row: &Row<'_>) -> Result<StoredChunk> {
    let kind: String = row.get(4)?;
    let kind = kind.parse::<ChunkKind>().map_err(|e| conversion_error(4, e))?;
    let term_freqs: String = row.get(8)?;
    let term_freqs: BTreeMap<String, u32> =
        serde_json::from_str(&term_freqs).map_err(|e| conversion_error(8, e))?;

    Ok(StoredChunk {
        rowid: row.get(0)?,
        chunk: Chunk {
            id: row.get(1)?,
            file_path: row.get(2)?,
            content: row.get(3)?,
            kind,
            language: row.get(5)?,
            start_line: row.get::<_, i64>(6)? as usize,
            end_line: row.get::<_, i64>(7)? as usize,
            symbols: Vec::new(),
            term_freqs,
        },
        has_embedding: row.get(9)?,
    })
}

fn map_symbol(row: &Row<'_>) -> Result<(i64, Symbol)> {
    let kind: String = row.get(2)?;
    let kind = kind.parse::<SymbolKind>().map_err(|e| conversion_error(2, e))?;
    Ok((
        row.get(0)?,
        Symbol {
            name: row.get(1)?,
            kind,
            start_line: row.get::<_, i64>(3)? as usize,
            start_column: row.get::<_, i64>(4)? as usize,
            end_line: row.get::<_, i64>(5)? as usize,
            end_column: row.get::<_, i64>(6)? as usize,
            context: row.get(7)?,
        },
    ))
}

impl Db {
    /// Write one file's chunks under `generation` in a single transaction.
    ///
    /// Each chunk lands in the chunk table, the FTS projection, the vector
    /// table (when it has an embedding) and the symbol table. Chunk ids already
    /// present in the generation are skipped. Returns the number written.
    pub fn insert_file_chunks(
        &mut self,
        repository: &str,
        generation: i64,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut written = 0;

        for EmbeddedChunk { chunk, embedding } in chunks {
            let term_freqs = serde_json::to_string(&chunk.term_freqs)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

            let inserted = tx.execute(
                r#"
                INSERT OR IGNORE INTO chunks (
                    repository, generation, chunk_id, file_path, content, kind, language,
                    start_line, end_line, token_count, term_freqs, has_embedding
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    repository,
                    generation,
                    chunk.id,
                    chunk.file_path,
                    chunk.content,
                    chunk.kind.as_str(),
                    chunk.language,
                    chunk.start_line as i64,
                    chunk.end_line as i64,
                    chunk.token_count() as i64,
                    term_freqs,
                    embedding.is_some(),
                ],
            )?;
            if inserted == 0 {
                continue;
            }
            let rowid = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO chunks_fts (rowid, content) VALUES (?, ?)",
                params![rowid, chunk.content],
            )?;

            if let Some(vector) = embedding {
                tx.execute(
                    "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
                    params![rowid, serialize_vector(vector)],
                )?;
            }

            for symbol in &chunk.symbols {
                tx.execute(
                    r#"
                    INSERT INTO symbols (chunk_rowid, name, kind, start_line, start_column, end_line, end_column, context)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                    params![
                        rowid,
                        symbol.name,
                        symbol.kind.as_str(),
                        symbol.start_line as i64,
                        symbol.start_column as i64,
                        symbol.end_line as i64,
                        symbol.end_column as i64,
                        symbol.context,
                    ],
                )?;
            }
            written += 1;
        }

        tx.commit()?;
        Ok(written)
    }

    /// Load chunks (with their symbols) by row id. Missing ids are ignored;
    /// results come back in row id order.
    pub fn load_chunks(&self, rowids: &[i64]) -> Result<Vec<StoredChunk>> {
        if rowids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Value> = rowids.iter().map(|&id| Value::Integer(id)).collect();
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let in_list = placeholders(ids.len());

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT id, chunk_id, file_path, content, kind, language, start_line, end_line,
                   term_freqs, has_embedding
            FROM chunks WHERE id IN ({in_list}) ORDER BY id
            "#
        ))?;
        let mut chunks: Vec<StoredChunk> = stmt
            .query_map(param_refs.as_slice(), map_chunk)?
            .collect::<Result<_>>()?;

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT chunk_rowid, name, kind, start_line, start_column, end_line, end_column, context
            FROM symbols WHERE chunk_rowid IN ({in_list}) ORDER BY id
            "#
        ))?;
        let mut by_chunk: HashMap<i64, Vec<Symbol>> = HashMap::new();
        for row in stmt.query_map(param_refs.as_slice(), map_symbol)? {
            let (rowid, symbol) = row?;
            by_chunk.entry(rowid).or_default().push(symbol);
        }
        for stored in &mut chunks {
            if let Some(symbols) = by_chunk.remove(&stored.rowid) {
                stored.chunk.symbols = symbols;
            }
        }

        Ok(chunks)
    }

    /// Row ids of chunks whose file path is one of `paths`.
    pub fn chunks_for_files(
        &self,
        repository: &str,
        generation: i64,
        paths: &[String],
    ) -> Result<Vec<i64>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let mut values = vec![Value::Text(repository.to_string()), Value::Integer(generation)];
        values.extend(paths.iter().map(|p| Value::Text(p.clone())));
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let mut stmt = self.conn.prepare(&format!(
            "SELECT id FROM chunks WHERE repository = ? AND generation = ? AND file_path IN ({}) ORDER BY id",
            placeholders(paths.len())
        ))?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| row.get::<_, i64>(0))?;
        rows.collect()
    }

    /// Row ids of chunks whose content contains any of `phrases`,
    /// ignoring ASCII case.
    pub fn chunks_containing(
        &self,
        repository: &str,
        generation: i64,
        phrases: &[String],
    ) -> Result<Vec<i64>> {
        let phrases: Vec<String> = phrases
            .iter()
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if phrases.is_empty() {
            return Ok(Vec::new());
        }
        let mut values = vec![Value::Text(repository.to_string()), Value::Integer(generation)];
        values.extend(phrases.into_iter().map(Value::Text));
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let conditions = vec!["instr(LOWER(content), ?) > 0"; values.len() - 2].join(" OR ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id FROM chunks WHERE repository = ? AND generation = ? AND ({conditions}) ORDER BY id"
        ))?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| row.get::<_, i64>(0))?;
        rows.collect()
    }

    /// Chunk ids of a generation, in insertion order.
    pub fn chunk_ids(&self, repository: &str, generation: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT chunk_id FROM chunks WHERE repository = ? AND generation = ? ORDER BY id",
        )?;
        let rows = stmt.query_map(params![repository, generation], |row| {
            row.get::<_, String>(0)
        })?;
        rows.collect()
    }
}
