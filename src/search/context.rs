//! Renders ranked chunks as a prompt block for a language-model client.
use std::fmt::Write as _;

use crate::search::engine::{SearchResult, group_by_file};

/// Render `results` grouped by file, in rank order, within `max_chars`
/// characters.
///
/// Chunks that do not fit are left out and counted in a trailing note. The
/// first chunk is always included, cut to fit when necessary.
pub fn render_context(results: &[SearchResult], max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    let mut omitted = 0;

    for (path, chunks) in group_by_file(results) {
        let mut header = format!("### {path}\n");
        for result in chunks {
            let chunk = &result.chunk;
            let mut block = String::new();
            let _ = writeln!(
                block,
                "-- lines {}-{} ({}, {}) score {:.2}: {}",
                chunk.start_line, chunk.end_line, chunk.kind, chunk.language, result.score, result.reason
            );
            let _ = writeln!(block, "```{}\n{}\n```", chunk.language, chunk.content);

            let needed = header.chars().count() + block.chars().count();
            if used + needed <= max_chars {
                out.push_str(&header);
                out.push_str(&block);
                used += needed;
                header.clear();
            } else if out.is_empty() {
                out.extend(header.chars().chain(block.chars()).take(max_chars));
                used = max_chars;
                header.clear();
            } else {
                omitted += 1;
            }
        }
    }

    if omitted > 0 {
        let _ = writeln!(out, "({omitted} more chunks omitted)");
    }
    out
}
