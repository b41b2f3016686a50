//! Pattern chunking for HTML-like files (HTML, Vue, Svelte).
use std::sync::LazyLock;

use regex::Regex;

use crate::indexer::chunker::{ChunkStrategy, ChunkerConfig, SourceText, collapse_whitespace, truncate};
use crate::types::{Chunk, ChunkKind, Symbol, SymbolKind};

static ELEMENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)<(?P<tag>head)\b[^>]*>(?P<inner>.*?)</head\s*>",
        r"(?is)<(?P<tag>title)\b[^>]*>(?P<inner>.*?)</title\s*>",
        r"(?is)<(?P<tag>h[1-6])\b[^>]*>(?P<inner>.*?)</h[1-6]\s*>",
        r"(?is)<(?P<tag>header)\b[^>]*>(?P<inner>.*?)</header\s*>",
        r"(?is)<(?P<tag>nav)\b[^>]*>(?P<inner>.*?)</nav\s*>",
        r"(?is)<(?P<tag>script)\b[^>]*>(?P<inner>.*?)</script\s*>",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?P<attr>id|class|src|href)\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)
        .unwrap()
});

/// Remove tags, collapse whitespace, trim.
pub fn strip_tags(html: &str) -> String {
    collapse_whitespace(&TAG_RE.replace_all(html, " "))
}

pub struct MarkupStrategy;

impl ChunkStrategy for MarkupStrategy {
    fn chunk(&self, source: &SourceText<'_>, config: &ChunkerConfig) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for pattern in ELEMENT_PATTERNS.iter() {
            for caps in pattern.captures_iter(source.text) {
                let (Some(whole), Some(tag), Some(inner)) =
                    (caps.get(0), caps.name("tag"), caps.name("inner"))
                else {
                    continue;
                };
                let tag = tag.as_str().to_ascii_lowercase();
                let (start_line, start_column) = source.position(whole.start());
                let (end_line, end_column) = source.position(whole.end().saturating_sub(1));

                let text = strip_tags(inner.as_str());
                let name = if text.is_empty() {
                    tag.clone()
                } else {
                    truncate(&text, config.display_chars)
                };
                let context = if text.is_empty() {
                    format!("<{tag}>")
                } else {
                    truncate(&format!("<{tag}> {text}"), config.context_chars)
                };

                let mut symbols = vec![Symbol {
                    name,
                    kind: SymbolKind::Element,
                    start_line,
                    start_column,
                    end_line,
                    end_column: end_column + 1,
                    context,
                }];
                symbols.extend(attribute_symbols(
                    source,
                    whole.start(),
                    whole.as_str(),
                    config,
                ));

                chunks.push(source.chunk(start_line, end_line, ChunkKind::Symbol, symbols));
            }
        }

        chunks
    }
}

/// `attribute` symbols for id/class/src/href values inside a matched element.
fn attribute_symbols(
    source: &SourceText<'_>,
    base: usize,
    element: &str,
    config: &ChunkerConfig,
) -> Vec<Symbol> {
    ATTRIBUTE_RE
        .captures_iter(element)
        .filter_map(|caps| {
            let attr = caps.name("attr")?.as_str().to_ascii_lowercase();
            let value = caps.name("dq").or_else(|| caps.name("sq"))?;
            let trimmed = value.as_str().trim();
            if trimmed.is_empty() {
                return None;
            }
            let (start_line, start_column) = source.position(base + value.start());
            let (end_line, end_column) = source.position(base + value.end());
            Some(Symbol {
                name: truncate(trimmed, config.display_chars),
                kind: SymbolKind::Attribute,
                start_line,
                start_column,
                end_line,
                end_column,
                context: truncate(&format!("{attr}=\"{trimmed}\""), config.context_chars),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Ben   Tossell</title>
  <link rel="stylesheet" href="styles.css">
</head>
<body>
  <header class="site-header">
    <nav id="main-nav"><a href="/">Home</a> <a href="/about">About</a></nav>
  </header>
  <h1>Welcome</h1>
  <script>
    document.title = "x";
  </script>
</body>
</html>
"#;

    fn chunks() -> Vec<Chunk> {
        let src = SourceText::new("index.html", "html", PAGE);
        MarkupStrategy.chunk(&src, &ChunkerConfig::default())
    }

    fn find<'a>(chunks: &'a [Chunk], tag: &str) -> &'a Chunk {
        chunks
            .iter()
            .find(|c| c.symbols[0].context.starts_with(&format!("<{tag}>")))
            .unwrap()
    }

    #[test]
    fn test_title_symbol() {
        let chunks = chunks();
        let title = find(&chunks, "title");
        assert_eq!(title.kind, ChunkKind::Symbol);
        assert_eq!((title.start_line, title.end_line), (4, 4));
        assert_eq!(title.symbols[0].name, "Ben Tossell");
        assert_eq!(title.symbols[0].kind, SymbolKind::Element);
        assert_eq!(title.symbols[0].start_column, 3);
        assert!(title.content.contains("Ben   Tossell"));
    }

    #[test]
    fn test_head_spans_lines() {
        let chunks = chunks();
        let head = find(&chunks, "head");
        assert_eq!((head.start_line, head.end_line), (3, 6));
        assert!(head.symbols.iter().any(|s| s.kind == SymbolKind::Attribute && s.name == "styles.css"));
    }

    #[test]
    fn test_header_and_nav_overlap() {
        let chunks = chunks();
        let header = find(&chunks, "header");
        let nav = find(&chunks, "nav");
        assert_eq!((header.start_line, header.end_line), (8, 10));
        assert_eq!((nav.start_line, nav.end_line), (9, 9));
        assert_eq!(nav.symbols[0].name, "Home About");
        assert!(header.symbols.iter().any(|s| s.name == "site-header"));
        assert!(nav.symbols.iter().any(|s| s.context == "id=\"main-nav\""));
    }

    #[test]
    fn test_heading_and_script() {
        let chunks = chunks();
        assert_eq!(find(&chunks, "h1").symbols[0].name, "Welcome");
        let script = find(&chunks, "script");
        assert_eq!((script.start_line, script.end_line), (12, 14));
    }

    #[test]
    fn test_empty_element_uses_tag_name() {
        let src = SourceText::new("a.html", "html", "<nav></nav>");
        let chunks = MarkupStrategy.chunk(&src, &ChunkerConfig::default());
        assert_eq!(chunks[0].symbols[0].name, "nav");
    }

    #[test]
    fn test_display_name_truncated() {
        let long = "word ".repeat(40);
        let html = format!("<h2>{long}</h2>");
        let src = SourceText::new("a.html", "html", &html);
        let chunks = MarkupStrategy.chunk(&src, &ChunkerConfig::default());
        assert_eq!(chunks[0].symbols[0].name.chars().count(), 80);
    }

    #[test]
    fn test_no_matches() {
        let src = SourceText::new("a.html", "html", "<div>plain</div>");
        assert!(MarkupStrategy.chunk(&src, &ChunkerConfig::default()).is_empty());
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<a href='/'>Home</a>\n <b>x</b>"), "Home x");
    }
}
