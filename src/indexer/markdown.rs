use std::sync::LazyLock;

use regex::Regex;

use crate::indexer::chunker::{ChunkStrategy, ChunkerConfig, SourceText, truncate};
use crate::types::{Chunk, ChunkKind, Symbol, SymbolKind};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})\s+(?P<text>.*?)\s*#*\s*$").unwrap());

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ {0,3}(```|~~~)").unwrap());

/// Lines holding ATX headings, skipping fenced code blocks.
fn heading_lines(source: &SourceText<'_>) -> Vec<(usize, String)> {
    let mut headings = Vec::new();
    let mut fence: Option<&str> = None;

    for (idx, line) in source.lines().iter().enumerate() {
        if let Some(caps) = FENCE_RE.captures(line) {
            let marker = caps.get(1).map_or("", |m| m.as_str());
            fence = match fence {
                Some(open) if open == marker => None,
                Some(open) => Some(open),
                None => Some(marker),
            };
            continue;
        }
        if fence.is_some() {
            continue;
        }
        if let Some(text) = HEADING_RE.captures(line).and_then(|c| c.name("text")) {
            let text = text.as_str().trim();
            if !text.is_empty() {
                headings.push((idx + 1, text.to_string()));
            }
        }
    }
    headings
}

/// One chunk per heading section; text before the first heading is its own block.
pub struct MarkdownStrategy;

impl ChunkStrategy for MarkdownStrategy {
    fn chunk(&self, source: &SourceText<'_>, config: &ChunkerConfig) -> Vec<Chunk> {
        let headings = heading_lines(source);
        if headings.is_empty() {
            return Vec::new();
        }

        let total = source.line_count();
        let mut chunks = Vec::new();

        let first = headings[0].0;
        if first > 1 && source.has_content(1, first - 1) {
            chunks.push(source.chunk(1, first - 1, ChunkKind::Block, Vec::new()));
        }

        for (i, (line_no, text)) in headings.iter().enumerate() {
            let end = headings.get(i + 1).map_or(total, |(next, _)| next - 1);
            let line = source.line(*line_no);
            let start_column = line.find(text.as_str()).map_or(1, |b| {
                line[..b].chars().count() + 1
            });
            let name = truncate(text, config.display_chars);
            let symbol = Symbol {
                end_column: start_column + name.chars().count(),
                name,
                kind: SymbolKind::Element,
                start_line: *line_no,
                start_column,
                end_line: *line_no,
                context: truncate(line.trim(), config.context_chars),
            };
            chunks.push(source.chunk(*line_no, end, ChunkKind::Block, vec![symbol]));
        }

        chunks
    }
}
