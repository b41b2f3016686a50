//! Query analysis: terms, quoted phrases and intent keywords.
use std::sync::LazyLock;

use regex::Regex;

use crate::indexer::terms::query_terms;
use crate::types::SymbolKind;

// An opening quote must not follow a word character, so "don't" is not a quote
static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[^\w])(?:'(?P<sq>[^'\n]+)'|"(?P<dq>[^"\n]+)")"#).unwrap()
});

/// Terms that mark a query as being about page navigation structure.
const NAVIGATION_TERMS: &[&str] = &[
    "header", "headers", "heading", "headings", "nav", "navbar", "navigation", "menu",
];

/// Query words naming a symbol kind.
fn kind_keyword(term: &str) -> Option<SymbolKind> {
    match term {
        "function" | "functions" | "method" | "methods" => Some(SymbolKind::Function),
        "class" | "classes" | "component" | "components" => Some(SymbolKind::Class),
        "variable" | "variables" | "const" | "constant" | "constants" => Some(SymbolKind::Variable),
        "import" | "imports" | "dependency" | "dependencies" => Some(SymbolKind::Import),
        "element" | "elements" | "tag" | "tags" => Some(SymbolKind::Element),
        "attribute" | "attributes" => Some(SymbolKind::Attribute),
        _ => None,
    }
}

/// Quoted substrings of a query, trimmed, in order of appearance.
pub fn quoted_phrases(query: &str) -> Vec<String> {
    QUOTED_RE
        .captures_iter(query)
        .filter_map(|caps| caps.name("sq").or_else(|| caps.name("dq")))
        .map(|m| m.as_str().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Everything the read path derives from the raw query text.
#[derive(Debug, Clone, Default)]
pub struct QueryAnalysis {
    pub raw: String,
    /// Distinct non-stopword tokens.
    pub terms: Vec<String>,
    pub phrases: Vec<String>,
    /// Symbol kinds named in the query.
    pub kinds: Vec<SymbolKind>,
    pub navigation: bool,
    pub mentions_function: bool,
    /// The query reads as a change to a user-facing page.
    pub ui_intent: bool,
}

impl QueryAnalysis {
    pub fn new(query: &str, ui_keywords: &[String]) -> Self {
        let terms = query_terms(query);

        let mut kinds = Vec::new();
        for kind in terms.iter().filter_map(|t| kind_keyword(t)) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        let navigation = terms.iter().any(|t| NAVIGATION_TERMS.contains(&t.as_str()));
        let mentions_function = kinds.contains(&SymbolKind::Function);
        let ui_intent = terms
            .iter()
            .any(|t| ui_keywords.iter().any(|k| k.eq_ignore_ascii_case(t)));

        Self {
            raw: query.to_string(),
            phrases: quoted_phrases(query),
            terms,
            kinds,
            navigation,
            mentions_function,
            ui_intent,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.phrases.is_empty()
    }
}
