use crate::config::SearchConfig;
use crate::db::Db;
use crate::embedder::{EmbedMode, Embedder, embed_with_timeout, is_usable};
use crate::error::Result;
use crate::search::boosts::{Boost, BoostPipeline};
use crate::search::fusion::{Fusion, Signals};
use crate::search::query::QueryAnalysis;
use crate::search::structural::{StructuralMatch, StructuralScorer};
use crate::types::Chunk;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, warn};

/// One ranked chunk with the evidence behind its score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub chunk: Chunk,
    /// Raw BM25 score.
    pub lexical_score: f64,
    pub vector_score: f64,
    pub structural_score: f64,
    /// Sum of boost rule contributions.
    pub boost_score: f64,
    /// Fused score plus boosts.
    pub score: f64,
    pub matched_terms: Vec<String>,
    pub reason: String,
}

/// Signals gathered for one candidate row.
#[derive(Debug, Default)]
struct Candidate {
    lexical: f64,
    matched_terms: Vec<String>,
    vector: f64,
    structural: StructuralMatch,
}

/// The read path: runs the three searches over a repository's current
/// snapshot, fuses them and applies boost rules.
pub struct QueryEngine {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    config: SearchConfig,
    embed_timeout: Duration,
    fusion: Fusion,
    structural: StructuralScorer,
    boosts: BoostPipeline,
}

impl QueryEngine {
    /// `manifests` are the project manifest names pinned by the essential
    /// config rule.
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
        config: SearchConfig,
        manifests: &[String],
        embed_timeout: Duration,
    ) -> Self {
        let boosts = BoostPipeline::from_config(&config.boosts, manifests);
        Self::with_boosts(db, embedder, config, boosts, embed_timeout)
    }

    pub fn with_boosts(
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
        config: SearchConfig,
        boosts: BoostPipeline,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            db,
            embedder,
            fusion: Fusion::new(config.weights, config.lexical_ceiling),
            structural: StructuralScorer::new(config.structural),
            config,
            embed_timeout,
            boosts,
        }
    }

    async fn query_vector(&self, query: &str) -> Option<Vec<f32>> {
        match embed_with_timeout(
            Arc::clone(&self.embedder),
            query.to_string(),
            EmbedMode::Query,
            self.embed_timeout,
        )
        .await
        {
            Ok(vector) if is_usable(&vector) => Some(vector),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "query embedding failed, searching without vectors");
                None
            }
        }
    }

    /// Top `limit` chunks of `repository` for `query`.
    ///
    /// A repository without a committed snapshot yields an empty list.
    pub async fn search(
        &self,
        repository: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let analysis = QueryAnalysis::new(query, &self.config.boosts.ui_keywords);
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.query_vector(query).await;

        // One lock hold: every read below sees the same generation
        let db = self.db.lock().await;
        let Some(generation) = db.current_generation(repository)? else {
            debug!(repository, "repository not indexed");
            return Ok(Vec::new());
        };
        let candidate_limit = self.config.candidate_limit.max(limit);

        let mut candidates: BTreeMap<i64, Candidate> = BTreeMap::new();

        for hit in db.search_lexical(repository, generation, &analysis.terms, candidate_limit)? {
            let c = candidates.entry(hit.rowid).or_default();
            c.lexical = hit.score;
            c.matched_terms = hit.matched_terms;
        }

        if let Some(vector) = query_vector.as_deref().filter(|v| v.len() == db.dimensions()) {
            for hit in db.search_vectors(
                repository,
                generation,
                vector,
                self.config.min_similarity,
                candidate_limit,
            )? {
                candidates.entry(hit.rowid).or_default().vector = f64::from(hit.similarity);
            }
        }

        let rows = db.find_symbols(repository, generation, &analysis.terms, &analysis.kinds)?;
        for (rowid, matched) in self.structural.top(&rows, &analysis, candidate_limit) {
            candidates.entry(rowid).or_default().structural = matched;
        }

        // Quoted phrases are boosted by containment, not by rank
        if !analysis.phrases.is_empty() {
            for rowid in db.chunks_containing(repository, generation, &analysis.phrases)? {
                candidates.entry(rowid).or_default();
            }
        }

        let pinned = self.boosts.pinned_files();
        if !pinned.is_empty() {
            for rowid in db.chunks_for_files(repository, generation, &pinned)? {
                candidates.entry(rowid).or_default();
            }
        }

        let rowids: Vec<i64> = candidates.keys().copied().collect();
        let chunks = db.load_chunks(&rowids)?;
        drop(db);

        let mut results: Vec<SearchResult> = chunks
            .into_iter()
            .filter_map(|stored| {
                let candidate = candidates.remove(&stored.rowid)?;
                self.rank(&analysis, stored.chunk, candidate)
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        results.truncate(limit);
        debug!(repository, query, results = results.len(), "search finished");
        Ok(results)
    }

    /// Fuse, boost and explain one candidate; `None` when it scores too low.
    fn rank(&self, analysis: &QueryAnalysis, chunk: Chunk, candidate: Candidate) -> Option<SearchResult> {
        let signals = Signals {
            lexical: candidate.lexical,
            vector: candidate.vector,
            structural: candidate.structural.score,
        };
        let fused = self.fusion.fuse(&signals);
        let boosts = self.boosts.apply(analysis, &chunk);
        let boost_score: f64 = boosts.iter().map(|b| b.score).sum();
        let score = fused + boost_score;
        if score <= self.config.min_score {
            return None;
        }

        let reason = self.reason(&signals, &candidate, &boosts);
        Some(SearchResult {
            chunk,
            lexical_score: signals.lexical,
            vector_score: signals.vector,
            structural_score: signals.structural,
            boost_score,
            score,
            matched_terms: candidate.matched_terms,
            reason,
        })
    }

    fn reason(&self, signals: &Signals, candidate: &Candidate, boosts: &[Boost]) -> String {
        let mut parts = Vec::new();
        if self.fusion.lexical_normalized(signals) >= self.config.lexical_significance
            && !candidate.matched_terms.is_empty()
        {
            parts.push(format!("text match ({})", candidate.matched_terms.join(", ")));
        }
        if signals.vector >= self.config.vector_significance {
            parts.push("semantic similarity".to_string());
        }
        if signals.structural > 0.0 {
            parts.push("structural match".to_string());
        }
        parts.extend(boosts.iter().map(|b| b.reason.clone()));

        if parts.is_empty() {
            "general relevance".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Group results by file, keeping rank order of first appearance.
pub fn group_by_file(results: &[SearchResult]) -> Vec<(&str, Vec<&SearchResult>)> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&SearchResult>> = HashMap::new();
    for result in results {
        let path = result.chunk.file_path.as_str();
        groups
            .entry(path)
            .or_insert_with(|| {
                order.push(path);
                Vec::new()
            })
            .push(result);
    }
    order
        .into_iter()
        .map(|path| (path, groups.remove(path).unwrap_or_default()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::fixtures::{chunk, embedded, symbol};
    use crate::embedder::mock::{FailingEmbedder, MockEmbedder};
    use crate::indexer::terms::term_frequencies;
    use crate::types::{ChunkKind, EmbeddedChunk, SymbolKind};

    const DIMS: usize = 64;

    fn with_tf(mut c: Chunk) -> Chunk {
        c.term_freqs = term_frequencies(&c.content);
        c
    }

    fn embed(embedder: &MockEmbedder, c: Chunk) -> EmbeddedChunk {
        let vector = embedder.embed(&c.embedding_text()).unwrap();
        embedded(c, Some(vector))
    }

    async fn engine_over(chunks: Vec<Chunk>, embedder: Arc<dyn Embedder>) -> QueryEngine {
        engine_with(chunks, embedder, Config::default().search).await
    }

    async fn engine_with(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        search: SearchConfig,
    ) -> QueryEngine {
        let mock = MockEmbedder::new(DIMS);
        let mut db = Db::open_in_memory(DIMS).unwrap();
        let generation = db.begin_pass("acme/site").unwrap();
        for c in chunks {
            let c = with_tf(c);
            db.insert_file_chunks("acme/site", generation, &[embed(&mock, c)])
                .unwrap();
        }
        db.commit_snapshot("acme/site", generation, "c1").unwrap();

        let config = Config::default();
        QueryEngine::new(
            Arc::new(TokioMutex::new(db)),
            embedder,
            search,
            &config.indexing.manifest_files,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_unknown_repository_is_empty() {
        let engine = engine_over(Vec::new(), Arc::new(MockEmbedder::new(DIMS))).await;
        assert!(engine.search("nobody/here", "title", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quoted_text_wins() {
        let title = Chunk {
            kind: ChunkKind::Symbol,
            language: "html".to_string(),
            symbols: vec![symbol("Ben Tossell", SymbolKind::Element, 3, "<title> Ben Tossell")],
            ..chunk("index.html", 3, 3, "<title>Ben Tossell</title>")
        };
        let css = chunk("styles.css", 1, 3, "h1 { color: #333; }\n.title { font-size: 2em; }");
        let engine = engine_over(vec![title, css], Arc::new(MockEmbedder::new(DIMS))).await;

        let results = engine
            .search("acme/site", "change the title to 'Ben Tossell'", 10)
            .await
            .unwrap();
        assert_eq!(results[0].chunk.file_path, "index.html");
        assert!(results[0].reason.contains("exact text match"));
        assert!(results[0].boost_score >= 2.0);
        if let Some(css) = results.iter().find(|r| r.chunk.file_path == "styles.css") {
            assert!(css.score < results[0].score - 2.0);
            assert_eq!(css.boost_score, 0.0);
        }
    }

    #[tokio::test]
    async fn test_manifest_pinned() {
        let manifest = chunk("package.json", 1, 3, "{\n  \"name\": \"acme\"\n}");
        let code = chunk("src/billing.js", 1, 1, "export const invoice = 1;");
        let engine = engine_over(vec![manifest, code], Arc::new(MockEmbedder::new(DIMS))).await;

        let results = engine.search("acme/site", "invoice", 10).await.unwrap();
        let manifest = results
            .iter()
            .find(|r| r.chunk.file_path == "package.json")
            .unwrap();
        assert!(manifest.reason.contains("essential project config"));
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_back_to_other_signals() {
        let a = chunk("a.md", 1, 2, "retry logic for uploads");
        let b = chunk("b.md", 1, 2, "unrelated words here");
        // Lexical alone stays small on a two-chunk corpus
        let search = SearchConfig {
            min_score: 0.01,
            ..Config::default().search
        };
        let engine = engine_with(vec![a, b], Arc::new(FailingEmbedder::new(DIMS)), search).await;

        let results = engine.search("acme/site", "retry uploads", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.file_path, "a.md");
        assert_eq!(results[0].vector_score, 0.0);
        assert!(results[0].reason.starts_with("text match (retry, uploads)"));
    }

    #[tokio::test]
    async fn test_results_sorted_and_limited() {
        let chunks = (1..=5)
            .map(|i| chunk(&format!("doc{i}.md"), 1, 1, &"cache ".repeat(i)))
            .collect();
        let engine = engine_over(chunks, Arc::new(MockEmbedder::new(DIMS))).await;

        let results = engine.search("acme/site", "cache", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(engine.search("acme/site", "cache", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_structural_match_not_limited_by_insertion_order() {
        let function_chunk = |path: &str, names: &[&str]| Chunk {
            kind: ChunkKind::Symbol,
            language: "javascript".to_string(),
            symbols: names
                .iter()
                .map(|n| symbol(n, SymbolKind::Function, 1, &format!("function {n}() {{")))
                .collect(),
            ..chunk(path, 1, 3, "export default {}")
        };
        let mut chunks: Vec<Chunk> = (0..20)
            .map(|i| function_chunk(&format!("src/h{i:02}.js"), &["noop"]))
            .collect();
        chunks.push(function_chunk("src/nav.js", &["renderNav", "renderMenu"]));

        let search = SearchConfig {
            candidate_limit: 2,
            ..Config::default().search
        };
        let engine = engine_with(chunks, Arc::new(MockEmbedder::new(DIMS)), search).await;

        let results = engine.search("acme/site", "which function", 1).await.unwrap();
        assert_eq!(results[0].chunk.file_path, "src/nav.js");
        assert!((results[0].structural_score - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_group_by_file() {
        let make = |path: &str, start| SearchResult {
            chunk: chunk(path, start, start, "x"),
            lexical_score: 0.0,
            vector_score: 0.0,
            structural_score: 0.0,
            boost_score: 0.0,
            score: 1.0,
            matched_terms: Vec::new(),
            reason: "general relevance".to_string(),
        };
        let results = vec![make("b.js", 1), make("a.js", 1), make("b.js", 9)];
        let groups = group_by_file(&results);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "b.js");
        assert_eq!(groups[0].1.len(), 2);
    }
}
