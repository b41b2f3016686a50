//! BM25 lexical search.
//!
//! FTS5 serves as the inverted index: it finds rows containing any query
//! term. Scoring happens here with corpus statistics taken from the
//! repository's snapshot alone, since FTS5's own `bm25()` sees every
//! repository and generation in the table.
use super::{Db, models::LexicalHit};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Result, params};
use std::collections::{BTreeMap, HashMap};

fn decode_term_freqs(idx: usize, raw: &str) -> Result<BTreeMap<String, u32>> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// One candidate document: term frequencies and length.
struct Posting {
    rowid: i64,
    term_freqs: BTreeMap<String, u32>,
    length: f64,
}

/// Build an FTS5 MATCH expression that ORs the quoted terms together.
pub fn fts_match_expression(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Okapi BM25 with the Lucene-style non-negative idf.
pub fn bm25_term(tf: f64, df: f64, n_docs: f64, doc_len: f64, avg_len: f64) -> f64 {
    if tf <= 0.0 || df <= 0.0 {
        return 0.0;
    }
    let idf = (1.0 + (n_docs - df + 0.5) / (df + 0.5)).ln();
    let norm = if avg_len > 0.0 {
        1.0 - B + B * doc_len / avg_len
    } else {
        1.0
    };
    idf * (tf * (K1 + 1.0)) / (tf + K1 * norm)
}

impl Db {
    /// Rank a snapshot's chunks against `terms` (already tokenized).
    ///
    /// Ties keep insertion order (ascending row id).
    pub fn search_lexical(
        &self,
        repository: &str,
        generation: i64,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<LexicalHit>> {
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let (n_docs, avg_len): (i64, f64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(AVG(token_count), 0.0) FROM chunks WHERE repository = ? AND generation = ?",
            params![repository, generation],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if n_docs == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.id, c.term_freqs, c.token_count
            FROM chunks_fts f
            JOIN chunks c ON c.id = f.rowid
            WHERE chunks_fts MATCH ?1 AND c.repository = ?2 AND c.generation = ?3
            ORDER BY c.id
            "#,
        )?;
        let rows = stmt.query_map(
            params![fts_match_expression(terms), repository, generation],
            |row| {
                let raw: String = row.get(1)?;
                Ok(Posting {
                    rowid: row.get(0)?,
                    term_freqs: decode_term_freqs(1, &raw)?,
                    length: row.get::<_, i64>(2)? as f64,
                })
            },
        )?;
        let postings: Vec<Posting> = rows.collect::<Result<_>>()?;

        // Every snapshot row containing a term is a candidate, so df is exact
        let mut df: HashMap<&str, f64> = HashMap::new();
        for posting in &postings {
            for term in terms {
                if posting.term_freqs.contains_key(term) {
                    *df.entry(term.as_str()).or_insert(0.0) += 1.0;
                }
            }
        }

        let n_docs = n_docs as f64;
        let mut hits: Vec<LexicalHit> = postings
            .into_iter()
            .filter_map(|posting| {
                let mut score = 0.0;
                let mut matched_terms = Vec::new();
                for term in terms {
                    let Some(&tf) = posting.term_freqs.get(term) else {
                        continue;
                    };
                    let term_df = df.get(term.as_str()).copied().unwrap_or(0.0);
                    score += bm25_term(tf as f64, term_df, n_docs, posting.length, avg_len);
                    matched_terms.push(term.clone());
                }
                (!matched_terms.is_empty()).then_some(LexicalHit {
                    rowid: posting.rowid,
                    score,
                    matched_terms,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.rowid.cmp(&b.rowid)));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Term-frequency map of one stored chunk.
    pub fn term_frequencies(&self, rowid: i64) -> Result<Option<BTreeMap<String, u32>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT term_freqs FROM chunks WHERE id = ?",
                params![rowid],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| decode_term_freqs(0, &raw)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::{chunk, embedded};
    use crate::indexer::terms::query_terms;

    fn setup(docs: &[(&str, &str)]) -> (Db, i64) {
        let mut db = Db::open_in_memory(4).unwrap();
        let g = db.begin_pass("acme/site").unwrap();
        let chunks: Vec<_> = docs
            .iter()
            .map(|(path, content)| embedded(chunk(path, 1, 1, content), None))
            .collect();
        db.insert_file_chunks("acme/site", g, &chunks).unwrap();
        db.commit_snapshot("acme/site", g, "c1").unwrap();
        (db, g)
    }

    #[test]
    fn test_bm25_term_monotonic_in_tf() {
        let low = bm25_term(1.0, 1.0, 10.0, 10.0, 10.0);
        let high = bm25_term(3.0, 1.0, 10.0, 10.0, 10.0);
        assert!(high > low);
        assert!(low > 0.0);
        assert_eq!(bm25_term(0.0, 1.0, 10.0, 10.0, 10.0), 0.0);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let common = bm25_term(1.0, 9.0, 10.0, 10.0, 10.0);
        let rare = bm25_term(1.0, 1.0, 10.0, 10.0, 10.0);
        assert!(rare > common);
        assert!(common > 0.0);
    }

    #[test]
    fn test_match_expression_quotes_terms() {
        let terms = vec!["ben".to_string(), "tossell".to_string()];
        assert_eq!(fts_match_expression(&terms), "\"ben\" OR \"tossell\"");
    }

    #[test]
    fn test_search_ranks_by_bm25() {
        let (db, g) = setup(&[
            ("a.txt", "header nav links"),
            ("b.txt", "footer copyright"),
            ("c.txt", "header header banner"),
        ]);
        let hits = db
            .search_lexical("acme/site", g, &query_terms("header"), 10)
            .unwrap();
        let files: Vec<i64> = hits.iter().map(|h| h.rowid).collect();
        assert_eq!(hits.len(), 2);
        // c.txt repeats the term
        assert_eq!(files, vec![3, 1]);
        assert_eq!(hits[0].matched_terms, vec!["header"]);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let (db, g) = setup(&[("a.txt", "alpha beta"), ("b.txt", "alpha gamma")]);
        let hits = db
            .search_lexical("acme/site", g, &query_terms("alpha"), 10)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, hits[1].score);
        assert!(hits[0].rowid < hits[1].rowid);
    }

    #[test]
    fn test_search_scoped_to_snapshot() {
        let (mut db, g) = setup(&[("a.txt", "alpha")]);
        let other = db.begin_pass("acme/other").unwrap();
        db.insert_file_chunks(
            "acme/other",
            other,
            &[embedded(chunk("z.txt", 1, 1, "alpha alpha"), None)],
        )
        .unwrap();
        db.commit_snapshot("acme/other", other, "x").unwrap();

        let hits = db
            .search_lexical("acme/site", g, &query_terms("alpha"), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_no_terms_no_hits() {
        let (db, g) = setup(&[("a.txt", "alpha")]);
        assert!(db.search_lexical("acme/site", g, &[], 10).unwrap().is_empty());
        assert!(
            db.search_lexical("acme/site", g, &query_terms("zzz"), 10)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_term_frequencies_lookup() {
        let (db, _) = setup(&[("a.txt", "alpha alpha beta")]);
        let tf = db.term_frequencies(1).unwrap().unwrap();
        assert_eq!(tf.get("alpha"), Some(&2));
        assert!(db.term_frequencies(99).unwrap().is_none());
    }
}
