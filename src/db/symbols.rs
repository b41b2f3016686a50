use super::{Db, models::SymbolRow};
use crate::types::{Symbol, SymbolKind};
use rusqlite::types::{Type, Value};
use rusqlite::{Result, params};

impl Db {
    /// Symbols of a snapshot whose name or context contains one of `terms`
    /// (case-insensitive), or whose kind is in `kinds`. Every match in the
    /// snapshot is returned; callers rank and cap per chunk.
    pub fn find_symbols(
        &self,
        repository: &str,
        generation: i64,
        terms: &[String],
        kinds: &[SymbolKind],
    ) -> Result<Vec<SymbolRow>> {
        if terms.is_empty() && kinds.is_empty() {
            return Ok(Vec::new());
        }

        let mut conditions = Vec::new();
        let mut values: Vec<Value> = vec![
            Value::Text(repository.to_string()),
            Value::Integer(generation),
        ];

        for term in terms {
            let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
            conditions.push(
                "(LOWER(s.name) LIKE ? ESCAPE '\\' OR LOWER(s.context) LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }
        if !kinds.is_empty() {
            conditions.push(format!("s.kind IN ({})", super::placeholders(kinds.len())));
            values.extend(kinds.iter().map(|k| Value::Text(k.as_str().to_string())));
        }

        let query = format!(
            r#"
            SELECT s.chunk_rowid, s.name, s.kind, s.start_line, s.start_column,
                   s.end_line, s.end_column, s.context
            FROM symbols s
            JOIN chunks c ON s.chunk_rowid = c.id
            WHERE c.repository = ? AND c.generation = ? AND ({})
            ORDER BY s.id
            "#,
            conditions.join(" OR ")
        );

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            let kind: String = row.get(2)?;
            let kind = kind.parse::<SymbolKind>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
            })?;
            Ok(SymbolRow {
                chunk_rowid: row.get(0)?,
                symbol: Symbol {
                    name: row.get(1)?,
                    kind,
                    start_line: row.get::<_, i64>(3)? as usize,
                    start_column: row.get::<_, i64>(4)? as usize,
                    end_line: row.get::<_, i64>(5)? as usize,
                    end_column: row.get::<_, i64>(6)? as usize,
                    context: row.get(7)?,
                },
            })
        })?;
        rows.collect()
    }

    /// Number of symbols stored for one chunk.
    pub fn symbol_count(&self, rowid: i64) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM symbols WHERE chunk_rowid = ?",
            params![rowid],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::{chunk, embedded, symbol};

    fn setup() -> (Db, i64) {
        let mut db = Db::open_in_memory(4).unwrap();
        let g = db.begin_pass("acme/site").unwrap();

        let mut header = chunk("index.html", 1, 5, "<header><nav>Home</nav></header>");
        header.symbols.push(symbol(
            "Home",
            SymbolKind::Element,
            1,
            "<header> Home",
        ));
        let mut script = chunk("app.js", 1, 11, "function initMenu() {}");
        script.symbols.push(symbol(
            "initMenu",
            SymbolKind::Function,
            1,
            "function initMenu() {}",
        ));
        db.insert_file_chunks(
            "acme/site",
            g,
            &[embedded(header, None), embedded(script, None)],
        )
        .unwrap();
        db.commit_snapshot("acme/site", g, "c1").unwrap();
        (db, g)
    }

    #[test]
    fn test_find_by_term_in_context() {
        let (db, g) = setup();
        let rows = db
            .find_symbols("acme/site", g, &["header".to_string()], &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol.name, "Home");
        assert_eq!(rows[0].chunk_rowid, 1);
    }

    #[test]
    fn test_find_case_insensitive_name() {
        let (db, g) = setup();
        let rows = db
            .find_symbols("acme/site", g, &["menu".to_string()], &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol.kind, SymbolKind::Function);
    }

    #[test]
    fn test_find_by_kind() {
        let (db, g) = setup();
        let rows = db
            .find_symbols("acme/site", g, &[], &[SymbolKind::Function])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol.name, "initMenu");
        assert_eq!(db.symbol_count(rows[0].chunk_rowid).unwrap(), 1);
    }

    #[test]
    fn test_kind_match_returns_every_symbol() {
        let mut db = Db::open_in_memory(4).unwrap();
        let g = db.begin_pass("acme/site").unwrap();
        let chunks: Vec<_> = (0..300)
            .map(|i| {
                let name = format!("handler{i}");
                let content = format!("function {name}() {{}}");
                let mut c = chunk(&format!("src/h{i}.js"), 1, 3, &content);
                c.symbols.push(symbol(&name, SymbolKind::Function, 1, &content));
                embedded(c, None)
            })
            .collect();
        db.insert_file_chunks("acme/site", g, &chunks).unwrap();

        let rows = db
            .find_symbols("acme/site", g, &[], &[SymbolKind::Function])
            .unwrap();
        assert_eq!(rows.len(), 300);
        assert_eq!(rows.last().unwrap().symbol.name, "handler299");
    }

    #[test]
    fn test_like_wildcards_are_literal() {
        let (db, g) = setup();
        let rows = db
            .find_symbols("acme/site", g, &["%".to_string()], &[])
            .unwrap();
        assert!(rows.is_empty());
    }
}
