//! Pattern chunking for JavaScript and TypeScript.
//!
//! Declarations (functions, classes, top-level consts) become symbol chunks
//! spanning the declaration line plus a lookahead window. Runs of import
//! statements become one import chunk, and `/** */` blocks become comment
//! chunks.
use std::sync::LazyLock;

use regex::Regex;

use crate::indexer::chunker::{ChunkStrategy, ChunkerConfig, SourceText, truncate};
use crate::types::{Chunk, ChunkKind, Symbol, SymbolKind};

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\b\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)",
    )
    .unwrap()
});

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(?P<name>[A-Za-z_$][\w$]*)",
    )
    .unwrap()
});

// Top level only: no indentation
static CONST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?const\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=]*)?=\s*(?P<value>.*)$")
        .unwrap()
});

static FUNCTION_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:async\s+)?(?:function\b|\(.*\)\s*(?::\s*[^=]+)?=>|[A-Za-z_$][\w$]*\s*=>)")
        .unwrap()
});

static IMPORT_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*import(?:\s+|\s*\{|\s*\*|\s*['"])"#).unwrap());

static IMPORT_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\b(?:[^'"]*?\bfrom\s*)?\s*['"](?P<module>[^'"]+)['"]"#).unwrap()
});

static FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bfrom\s*['"](?P<module>[^'"]+)['"]"#).unwrap());

static REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?:const|let|var)\s+[^=]+=\s*require\(\s*['"](?P<module>[^'"]+)['"]\s*\)"#,
    )
    .unwrap()
});

/// Byte offset to 1-based char column within a line.
fn column(line: &str, byte: usize) -> usize {
    line.get(..byte).map_or(0, |s| s.chars().count()) + 1
}

fn point_symbol(
    name: &str,
    kind: SymbolKind,
    line_no: usize,
    col: usize,
    context: &str,
    config: &ChunkerConfig,
) -> Symbol {
    Symbol {
        name: name.to_string(),
        kind,
        start_line: line_no,
        start_column: col,
        end_line: line_no,
        end_column: col + name.chars().count(),
        context: truncate(context.trim(), config.context_chars),
    }
}

/// A recognized import statement: where it ends and what it imports.
struct ImportStatement {
    end_line: usize,
    symbol: Symbol,
}

fn import_statement(
    source: &SourceText<'_>,
    line_no: usize,
    config: &ChunkerConfig,
) -> Option<ImportStatement> {
    let line = source.line(line_no);

    if let Some(caps) = REQUIRE_RE.captures(line) {
        let module = caps.name("module")?;
        return Some(ImportStatement {
            end_line: line_no,
            symbol: point_symbol(
                module.as_str(),
                SymbolKind::Import,
                line_no,
                column(line, module.start()),
                line,
                config,
            ),
        });
    }

    if !IMPORT_START_RE.is_match(line) {
        return None;
    }
    if let Some(module) = IMPORT_MODULE_RE.captures(line).and_then(|c| c.name("module")) {
        return Some(ImportStatement {
            end_line: line_no,
            symbol: point_symbol(
                module.as_str(),
                SymbolKind::Import,
                line_no,
                column(line, module.start()),
                line,
                config,
            ),
        });
    }

    // Multi-line `import { ... } from '...'`
    let last = (line_no + config.lookahead).min(source.line_count());
    (line_no + 1..=last).find_map(|n| {
        let text = source.line(n);
        let module = FROM_RE.captures(text)?.name("module")?;
        Some(ImportStatement {
            end_line: n,
            symbol: point_symbol(
                module.as_str(),
                SymbolKind::Import,
                n,
                column(text, module.start()),
                line,
                config,
            ),
        })
    })
}

fn declaration(line: &str, line_no: usize, config: &ChunkerConfig) -> Option<Symbol> {
    let (caps, kind) = if let Some(caps) = FUNCTION_RE.captures(line) {
        (caps, SymbolKind::Function)
    } else if let Some(caps) = CLASS_RE.captures(line) {
        (caps, SymbolKind::Class)
    } else if let Some(caps) = CONST_RE.captures(line) {
        let value = caps.name("value").map_or("", |v| v.as_str());
        let kind = if FUNCTION_VALUE_RE.is_match(value) {
            SymbolKind::Function
        } else {
            SymbolKind::Variable
        };
        (caps, kind)
    } else {
        return None;
    };
    let name = caps.name("name")?;
    Some(point_symbol(
        name.as_str(),
        kind,
        line_no,
        column(line, name.start()),
        line,
        config,
    ))
}

/// Last line of a `/** ... */` block opening on `line_no`.
fn doc_comment_end(source: &SourceText<'_>, line_no: usize) -> Option<usize> {
    let line = source.line(line_no);
    let open = line.find("/**")?;
    if !line[..open].trim().is_empty() {
        return None;
    }
    if line[open + 3..].contains("*/") {
        return Some(line_no);
    }
    Some(
        (line_no + 1..=source.line_count())
            .find(|&n| source.line(n).contains("*/"))
            .unwrap_or(source.line_count()),
    )
}

struct ImportGroup {
    start: usize,
    end: usize,
    symbols: Vec<Symbol>,
}

impl ImportGroup {
    fn flush(self, source: &SourceText<'_>, chunks: &mut Vec<Chunk>) {
        chunks.push(source.chunk(self.start, self.end, ChunkKind::Import, self.symbols));
    }
}

pub struct ProceduralStrategy;

impl ChunkStrategy for ProceduralStrategy {
    fn chunk(&self, source: &SourceText<'_>, config: &ChunkerConfig) -> Vec<Chunk> {
        let total = source.line_count();
        let mut chunks = Vec::new();
        let mut comments = Vec::new();
        let mut group: Option<ImportGroup> = None;

        let mut line_no = 1;
        while line_no <= total {
            if let Some(stmt) = import_statement(source, line_no, config) {
                match group.as_mut() {
                    Some(g) => {
                        g.end = stmt.end_line;
                        g.symbols.push(stmt.symbol);
                    }
                    None => {
                        group = Some(ImportGroup {
                            start: line_no,
                            end: stmt.end_line,
                            symbols: vec![stmt.symbol],
                        })
                    }
                }
                line_no = stmt.end_line + 1;
                continue;
            }

            let line = source.line(line_no);
            if line.trim().is_empty() {
                // Blank lines do not break an import run
                line_no += 1;
                continue;
            }
            if let Some(g) = group.take() {
                g.flush(source, &mut chunks);
            }

            if let Some(symbol) = declaration(line, line_no, config) {
                let end = (line_no + config.lookahead).min(total);
                chunks.push(source.chunk(line_no, end, ChunkKind::Symbol, vec![symbol]));
            }
            if let Some(end) = doc_comment_end(source, line_no) {
                comments.push(source.chunk(line_no, end, ChunkKind::Comment, Vec::new()));
            }
            line_no += 1;
        }
        if let Some(g) = group.take() {
            g.flush(source, &mut chunks);
        }

        // Comments alone do not count as matches
        if chunks.is_empty() {
            return Vec::new();
        }
        chunks.extend(comments);
        chunks
    }
}
