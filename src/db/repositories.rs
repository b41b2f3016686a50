use super::{Db, models::*, purge_chunks};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Result, Row, params};
use std::collections::BTreeMap;

fn map_repository(row: &Row<'_>) -> Result<RepositoryRecord> {
    let state: String = row.get(5)?;
    let state = state
        .parse::<IndexState>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?;

    Ok(RepositoryRecord {
        name: row.get(0)?,
        last_commit: row.get(1)?,
        indexed_at: row.get(2)?,
        total_chunks: row.get::<_, i64>(3)? as usize,
        current_generation: row.get(4)?,
        state,
        last_error: row.get(6)?,
    })
}

const REPOSITORY_COLUMNS: &str =
    "name, last_commit, indexed_at, total_chunks, current_generation, state, last_error";

impl Db {
    /// Look up a repository record.
    pub fn get_repository(&self, name: &str) -> Result<Option<RepositoryRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE name = ?"),
                params![name],
                map_repository,
            )
            .optional()
    }

    /// All repository records, ordered by name.
    pub fn list_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REPOSITORY_COLUMNS} FROM repositories ORDER BY name"
        ))?;
        let rows = stmt.query_map([], map_repository)?;
        rows.collect()
    }

    /// Generation readers should use, or `None` when nothing is committed.
    pub fn current_generation(&self, name: &str) -> Result<Option<i64>> {
        let generation: Option<i64> = self
            .conn
            .query_row(
                "SELECT current_generation FROM repositories WHERE name = ?",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(generation.filter(|&g| g > 0))
    }

    /// Start an index pass: create the record if needed, mark it indexing and
    /// clear rows left behind by an abandoned pass. Returns the generation the
    /// pass should write under.
    pub fn begin_pass(&mut self, name: &str) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO repositories (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
            params![name],
        )?;
        tx.execute(
            "UPDATE repositories SET state = 'indexing', last_error = NULL WHERE name = ?",
            params![name],
        )?;
        let current: i64 = tx.query_row(
            "SELECT current_generation FROM repositories WHERE name = ?",
            params![name],
            |row| row.get(0),
        )?;
        purge_chunks(&tx, name, current, "!=")?;
        tx.commit()?;
        Ok(current + 1)
    }

    /// Commit point of a pass: flip the current generation and record the
    /// commit, timestamp and chunk count, then drop every other generation.
    pub fn commit_snapshot(&mut self, name: &str, generation: i64, commit: &str) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let total: i64 = tx.query_row(
            "SELECT COUNT(*) FROM chunks WHERE repository = ? AND generation = ?",
            params![name, generation],
            |row| row.get(0),
        )?;
        tx.execute(
            r#"
            UPDATE repositories SET
                current_generation = ?2,
                last_commit = ?3,
                indexed_at = ?4,
                total_chunks = ?5,
                state = 'indexed',
                last_error = NULL
            WHERE name = ?1
            "#,
            params![name, generation, commit, Utc::now(), total],
        )?;
        purge_chunks(&tx, name, generation, "!=")?;
        tx.commit()?;
        Ok(total as usize)
    }

    /// Abandon a pass: record the error and drop whatever it wrote. The
    /// committed snapshot and commit identifier are left untouched.
    pub fn mark_failed(&mut self, name: &str, generation: i64, error: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE repositories SET state = 'failed', last_error = ?2 WHERE name = ?1",
            params![name, error],
        )?;
        purge_chunks(&tx, name, generation, "=")?;
        tx.commit()
    }

    /// Stats for the committed snapshot, or `None` when there is none.
    pub fn repository_stats(&self, name: &str) -> Result<Option<IndexStats>> {
        let Some(record) = self.get_repository(name)? else {
            return Ok(None);
        };
        if !record.has_snapshot() {
            return Ok(None);
        }
        let generation = record.current_generation;

        let by_kind = self.group_count(name, generation, "kind")?;
        let by_language = self.group_count(name, generation, "language")?;

        let (total_chunks, chunks_with_embedding): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(has_embedding), 0) FROM chunks WHERE repository = ? AND generation = ?",
            params![name, generation],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let total_symbols: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM symbols s
            JOIN chunks c ON s.chunk_rowid = c.id
            WHERE c.repository = ? AND c.generation = ?
            "#,
            params![name, generation],
            |row| row.get(0),
        )?;

        Ok(Some(IndexStats {
            repository: record.name,
            total_chunks: total_chunks as usize,
            total_symbols: total_symbols as usize,
            chunks_with_embedding: chunks_with_embedding as usize,
            last_indexed: record.indexed_at,
            last_commit: record.last_commit,
            by_kind,
            by_language,
        }))
    }

    fn group_count(
        &self,
        name: &str,
        generation: i64,
        column: &str,
    ) -> Result<BTreeMap<String, usize>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {column}, COUNT(*) FROM chunks WHERE repository = ? AND generation = ? GROUP BY {column}"
        ))?;
        let rows = stmt.query_map(params![name, generation], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        rows.collect()
    }
}
