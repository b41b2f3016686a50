//! Structural scoring over matched symbols.
use std::collections::HashMap;

use crate::config::StructuralWeights;
use crate::db::SymbolRow;
use crate::search::query::QueryAnalysis;
use crate::types::{Symbol, SymbolKind};

/// Accumulated structural evidence for one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuralMatch {
    pub score: f64,
    /// Names of the matching symbols, in match order.
    pub symbols: Vec<String>,
}

pub struct StructuralScorer {
    weights: StructuralWeights,
}

impl StructuralScorer {
    pub fn new(weights: StructuralWeights) -> Self {
        Self { weights }
    }

    /// Whether `symbol` matches the query by name, context or kind.
    pub fn matches(symbol: &Symbol, analysis: &QueryAnalysis) -> bool {
        if analysis.kinds.contains(&symbol.kind) {
            return true;
        }
        let name = symbol.name.to_lowercase();
        let context = symbol.context.to_lowercase();
        analysis
            .terms
            .iter()
            .any(|t| name.contains(t.as_str()) || context.contains(t.as_str()))
    }

    /// Contribution of one matching symbol.
    pub fn weight(&self, kind: SymbolKind, analysis: &QueryAnalysis) -> f64 {
        match kind {
            SymbolKind::Element if analysis.navigation => self.weights.navigation_element,
            SymbolKind::Function if analysis.mentions_function => self.weights.function,
            _ => self.weights.base,
        }
    }

    /// Sum symbol weights per chunk row id.
    pub fn score(&self, rows: &[SymbolRow], analysis: &QueryAnalysis) -> HashMap<i64, StructuralMatch> {
        let mut scores: HashMap<i64, StructuralMatch> = HashMap::new();
        for row in rows {
            if !Self::matches(&row.symbol, analysis) {
                continue;
            }
            let entry = scores.entry(row.chunk_rowid).or_default();
            entry.score += self.weight(row.symbol.kind, analysis);
            entry.symbols.push(row.symbol.name.clone());
        }
        scores
    }

    /// The `limit` best-scoring chunks, ties broken by row id.
    pub fn top(
        &self,
        rows: &[SymbolRow],
        analysis: &QueryAnalysis,
        limit: usize,
    ) -> Vec<(i64, StructuralMatch)> {
        let mut ranked: Vec<(i64, StructuralMatch)> = self.score(rows, analysis).into_iter().collect();
        ranked.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }
}
