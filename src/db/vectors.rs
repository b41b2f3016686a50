use super::{Db, deserialize_vector, models::VectorHit, serialize_vector};
use rusqlite::{OptionalExtension, Result, params};

/// Cosine similarity in `[-1, 1]`. Zero when the lengths differ, either
/// vector is empty or either norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cos = dot / (norm_a.sqrt() * norm_b.sqrt());
    if cos.is_finite() {
        cos.clamp(-1.0, 1.0) as f32
    } else {
        0.0
    }
}

impl Db {
    /// Rank a snapshot's embedded chunks by cosine similarity to `query`,
    /// keeping only hits strictly above `min_similarity`.
    ///
    /// Distances come from sqlite-vec; a zero query vector matches nothing.
    pub fn search_vectors(
        &self,
        repository: &str,
        generation: i64,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        if limit == 0 || query.len() != self.dimensions || query.iter().all(|&v| v == 0.0) {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, similarity FROM (
                SELECT c.id AS id, 1.0 - vec_distance_cosine(v.embedding, ?) AS similarity
                FROM vec_chunks v
                JOIN chunks c ON v.rowid = c.id
                WHERE c.repository = ? AND c.generation = ? AND c.has_embedding = 1
            )
            WHERE similarity > ?
            ORDER BY similarity DESC, id
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map(
            params![
                serialize_vector(query),
                repository,
                generation,
                f64::from(min_similarity),
                limit as i64
            ],
            |row| {
                let similarity: f64 = row.get(1)?;
                Ok(VectorHit {
                    rowid: row.get(0)?,
                    similarity: similarity.clamp(-1.0, 1.0) as f32,
                })
            },
        )?;
        rows.collect()
    }

    /// Stored embedding of one chunk.
    pub fn get_vector(&self, rowid: i64) -> Result<Option<Vec<f32>>> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT embedding FROM vec_chunks WHERE rowid = ?",
                params![rowid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.map(|b| deserialize_vector(&b)))
    }
}
