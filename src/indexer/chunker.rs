//! Splits a file into addressable chunks.
//!
//! Each language family has a [`ChunkStrategy`] that finds pattern chunks
//! (declarations, elements, sections). When a strategy finds nothing the whole
//! file is windowed generically; when it does, the lines no pattern chunk
//! covers are windowed the same way.
use std::collections::HashMap;

use crate::config::IndexingConfig;
use crate::indexer::generic;
use crate::indexer::languages::{LanguageConfig, LanguageFamily};
use crate::indexer::terms::term_frequencies;
use crate::indexer::{markdown, markup, procedural};
use crate::types::{Chunk, ChunkKind, Symbol};

/// Tunables shared by every strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub fallback_window: usize,
    pub lookahead: usize,
    pub display_chars: usize,
    pub context_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            fallback_window: 50,
            lookahead: 10,
            display_chars: 80,
            context_chars: 200,
        }
    }
}

impl From<&IndexingConfig> for ChunkerConfig {
    fn from(cfg: &IndexingConfig) -> Self {
        Self {
            fallback_window: cfg.fallback_window_lines.max(1),
            lookahead: cfg.lookahead_lines,
            display_chars: cfg.display_chars,
            context_chars: cfg.context_chars,
        }
    }
}

/// A per-language chunking strategy.
pub trait ChunkStrategy: Send + Sync {
    /// Pattern chunks for `source`. An empty result means "no matches" and
    /// triggers the generic fallback for the whole file.
    fn chunk(&self, source: &SourceText<'_>, config: &ChunkerConfig) -> Vec<Chunk>;
}

/// A file's text with line and offset bookkeeping.
pub struct SourceText<'a> {
    pub path: &'a str,
    pub language: &'a str,
    pub text: &'a str,
    lines: Vec<&'a str>,
    line_starts: Vec<usize>,
}

impl<'a> SourceText<'a> {
    pub fn new(path: &'a str, language: &'a str, text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        let mut lines: Vec<&str> = text.split('\n').map(|l| l.trim_end_matches('\r')).collect();
        // A trailing newline does not start another line
        if text.ends_with('\n') {
            lines.pop();
            line_starts.pop();
        }
        Self {
            path,
            language,
            text,
            lines,
            line_starts,
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Text of 1-based line `n`.
    pub fn line(&self, n: usize) -> &'a str {
        self.lines.get(n.wrapping_sub(1)).copied().unwrap_or("")
    }

    pub fn lines(&self) -> &[&'a str] {
        &self.lines
    }

    /// 1-based line and column (in chars) of a byte offset.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.text.len());
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let idx = idx.min(self.line_starts.len().saturating_sub(1));
        let start = self.line_starts.get(idx).copied().unwrap_or(0);
        let column = self.text.get(start..offset).map_or(0, |s| s.chars().count()) + 1;
        (idx + 1, column)
    }

    /// Whether lines `start..=end` hold anything but whitespace.
    pub fn has_content(&self, start: usize, end: usize) -> bool {
        (start..=end).any(|n| !self.line(n).trim().is_empty())
    }

    /// Build a chunk over lines `start..=end` (clipped to the file).
    pub fn chunk(&self, start: usize, end: usize, kind: ChunkKind, symbols: Vec<Symbol>) -> Chunk {
        let last = self.line_count().max(1);
        let start = start.clamp(1, last);
        let end = end.clamp(start, last);
        let content = self.lines[start - 1..end].join("\n");
        Chunk {
            id: Chunk::make_id(self.path, start, end, kind),
            file_path: self.path.to_string(),
            term_freqs: term_frequencies(&content),
            content,
            kind,
            language: self.language.to_string(),
            start_line: start,
            end_line: end,
            symbols,
        }
    }
}

/// Collapse whitespace runs to single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to `max` chars on a char boundary.
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Entry point used by the indexer.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    fn strategy(family: LanguageFamily) -> Option<&'static dyn ChunkStrategy> {
        match family {
            LanguageFamily::Markup => Some(&markup::MarkupStrategy),
            LanguageFamily::Procedural => Some(&procedural::ProceduralStrategy),
            LanguageFamily::Markdown => Some(&markdown::MarkdownStrategy),
            LanguageFamily::Generic => None,
        }
    }

    /// Chunk one file. Empty or whitespace-only text yields no chunks.
    pub fn chunk_file(&self, path: &str, language: &LanguageConfig, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let source = SourceText::new(path, language.name, text);

        let pattern_chunks = Self::strategy(language.family)
            .map(|s| s.chunk(&source, &self.config))
            .unwrap_or_default();

        let mut chunks = if pattern_chunks.is_empty() {
            generic::window_chunks(&source, 1, source.line_count(), self.config.fallback_window)
        } else {
            let gaps = self.fill_gaps(&source, &pattern_chunks);
            let mut all = pattern_chunks;
            all.extend(gaps);
            all
        };

        dedupe_and_sort(&mut chunks);
        chunks
    }

    /// Generic windows over uncovered runs that hold non-whitespace text.
    fn fill_gaps(&self, source: &SourceText<'_>, chunks: &[Chunk]) -> Vec<Chunk> {
        let total = source.line_count();
        let mut covered = vec![false; total + 1];
        for chunk in chunks {
            for line in chunk.start_line..=chunk.end_line.min(total) {
                covered[line] = true;
            }
        }

        let mut gaps = Vec::new();
        let mut line = 1;
        while line <= total {
            if covered[line] {
                line += 1;
                continue;
            }
            let start = line;
            while line <= total && !covered[line] {
                line += 1;
            }
            let end = line - 1;
            if source.has_content(start, end) {
                gaps.extend(generic::window_chunks(
                    source,
                    start,
                    end,
                    self.config.fallback_window,
                ));
            }
        }
        gaps
    }
}

/// Merge chunks sharing an id into the first one, then order by position.
///
/// Matches on the same line range share an id; their symbols are kept.
fn dedupe_and_sort(chunks: &mut Vec<Chunk>) {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks.drain(..) {
        match index.get(&chunk.id) {
            Some(&i) => {
                let kept = &mut merged[i];
                for symbol in chunk.symbols {
                    if !kept.symbols.contains(&symbol) {
                        kept.symbols.push(symbol);
                    }
                }
            }
            None => {
                index.insert(chunk.id.clone(), merged.len());
                merged.push(chunk);
            }
        }
    }
    *chunks = merged;
    chunks.sort_by(|a, b| {
        a.start_line
            .cmp(&b.start_line)
            .then(a.end_line.cmp(&b.end_line))
            .then(a.kind.cmp(&b.kind))
    });
}
