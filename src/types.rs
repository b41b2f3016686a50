//! Core data types shared by the chunker, the store and the query engine.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Kind of a retrievable chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Symbol,
    Block,
    Comment,
    Import,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Symbol => "symbol",
            ChunkKind::Block => "block",
            ChunkKind::Comment => "comment",
            ChunkKind::Import => "import",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "symbol" => Ok(ChunkKind::Symbol),
            "block" => Ok(ChunkKind::Block),
            "comment" => Ok(ChunkKind::Comment),
            "import" => Ok(ChunkKind::Import),
            other => Err(format!("unknown chunk kind: {other}")),
        }
    }
}

/// Kind of a structural symbol found inside a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Variable,
    Import,
    Element,
    Attribute,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 6] = [
        SymbolKind::Function,
        SymbolKind::Class,
        SymbolKind::Variable,
        SymbolKind::Import,
        SymbolKind::Element,
        SymbolKind::Attribute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Variable => "variable",
            SymbolKind::Import => "import",
            SymbolKind::Element => "element",
            SymbolKind::Attribute => "attribute",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SymbolKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown symbol kind: {s}"))
    }
}

/// A named structural unit inside a chunk. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    /// Bounded snippet of surrounding source.
    pub context: String,
}

/// An addressable span of a source file, as produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub file_path: String,
    pub content: String,
    pub kind: ChunkKind,
    pub language: String,
    pub start_line: usize,
    pub end_line: usize,
    pub symbols: Vec<Symbol>,
    #[serde(skip)]
    pub term_freqs: BTreeMap<String, u32>,
}

impl Chunk {
    /// Deterministic chunk id: `path:start-end:kind`.
    pub fn make_id(path: &str, start_line: usize, end_line: usize, kind: ChunkKind) -> String {
        format!("{path}:{start_line}-{end_line}:{kind}")
    }

    /// Number of lexical tokens in the chunk.
    pub fn token_count(&self) -> usize {
        self.term_freqs.values().map(|&n| n as usize).sum()
    }

    /// Text handed to the embedding provider, enriched with path and symbol context.
    pub fn embedding_text(&self) -> String {
        match self.symbols.first() {
            Some(symbol) => format!(
                "{} {} {}: {}",
                self.file_path, self.language, symbol.name, self.content
            ),
            None => format!("{} {}: {}", self.file_path, self.language, self.content),
        }
    }
}

/// A chunk paired with its embedding, ready to be written.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    /// `None` when the provider failed, timed out or returned an unusable vector.
    pub embedding: Option<Vec<f32>>,
}
