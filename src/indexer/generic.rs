use crate::indexer::chunker::SourceText;
use crate::types::{Chunk, ChunkKind};

/// Non-overlapping windows of `window` lines over `start..=end`.
pub fn window_chunks(source: &SourceText<'_>, start: usize, end: usize, window: usize) -> Vec<Chunk> {
    let window = window.max(1);
    let end = end.min(source.line_count());
    let mut chunks = Vec::new();
    let mut line = start.max(1);
    while line <= end {
        let last = (line + window - 1).min(end);
        chunks.push(source.chunk(line, last, ChunkKind::Block, Vec::new()));
        line = last + 1;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_partition_range() {
        let text: String = (1..=7).map(|i| format!("{i}\n")).collect();
        let src = SourceText::new("a.txt", "text", &text);
        let chunks = window_chunks(&src, 2, 7, 3);
        let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
        assert_eq!(spans, vec![(2, 4), (5, 7)]);
        assert_eq!(chunks[0].content, "2\n3\n4");
    }

    #[test]
    fn test_window_clipped_to_file() {
        let src = SourceText::new("a.txt", "text", "a\nb");
        let chunks = window_chunks(&src, 1, 10, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_line, 2);
    }
}
