use crate::config::{Config, IndexingConfig};
use crate::db::{Db, IndexState, IndexStats, RepositoryRecord};
use crate::embedder::{EmbedMode, Embedder, embed_with_timeout, is_usable, truncate_chars};
use crate::error::{IndexError, Result};
use crate::indexer::chunker::{Chunker, ChunkerConfig};
use crate::indexer::files::{FileFilter, SourceFile};
use crate::indexer::languages::LanguageConfig;
use crate::source::{SourceError, SourceProvider, SourceTree};
use crate::types::EmbeddedChunk;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as TokioMutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Knobs of the write path.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub indexing: IndexingConfig,
    pub fetch_timeout: Duration,
    pub embed_timeout: Duration,
    /// Chunk text is cut to this many characters before embedding.
    pub max_embed_chars: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl IndexerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            indexing: config.indexing.clone(),
            fetch_timeout: config.source.fetch_timeout(),
            embed_timeout: config.model.embed_timeout(),
            max_embed_chars: config.model.max_embed_chars,
        }
    }
}

/// Outcome of one index pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub repository: String,
    pub git_ref: String,
    pub commit: String,
    pub generation: i64,
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks_created: usize,
    pub chunks_without_embedding: usize,
    /// File-level problems that were skipped over.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// What one worker produced for one file.
struct FileOutcome {
    written: usize,
    without_embedding: usize,
}

/// Everything a worker needs, shared across the pool.
struct PassContext {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    chunker: Arc<Chunker>,
    repository: String,
    generation: i64,
    dimensions: usize,
    embed_timeout: Duration,
    max_embed_chars: usize,
}

/// The write path: fetches a tree, chunks and embeds it, and commits a new
/// snapshot per repository.
pub struct Indexer {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    source: Arc<dyn SourceProvider>,
    config: IndexerConfig,
    chunker: Arc<Chunker>,
    filter: Arc<FileFilter>,
    locks: std::sync::Mutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl Indexer {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
        source: Arc<dyn SourceProvider>,
        config: IndexerConfig,
    ) -> Result<Self> {
        let filter = FileFilter::from_config(&config.indexing)?;
        let chunker = Chunker::new(ChunkerConfig::from(&config.indexing));
        Ok(Self {
            db,
            embedder,
            source,
            config,
            chunker: Arc::new(chunker),
            filter: Arc::new(filter),
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Per-repository pass lock. A second request for the same repository
    /// waits for the first to finish.
    fn repository_lock(&self, repository: &str) -> Arc<TokioMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(repository.to_string()).or_default())
    }

    /// Run a blocking source call under the fetch timeout.
    async fn call_source<T, F>(&self, repository: &str, git_ref: &str, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SourceProvider, &str, &str) -> std::result::Result<T, SourceError>
            + Send
            + 'static,
    {
        let source = Arc::clone(&self.source);
        let (repo, gref) = (repository.to_string(), git_ref.to_string());
        let task = tokio::task::spawn_blocking(move || call(source.as_ref(), &repo, &gref));

        let unavailable = |reason: String| IndexError::SourceUnavailable {
            repository: repository.to_string(),
            git_ref: git_ref.to_string(),
            reason,
        };
        match tokio::time::timeout(self.config.fetch_timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(unavailable(e.to_string())),
            Ok(Err(join_err)) => Err(IndexError::Task(join_err.to_string())),
            Err(_) => Err(unavailable(format!(
                "timed out after {}s",
                self.config.fetch_timeout.as_secs_f64()
            ))),
        }
    }

    /// True when the repository was never indexed, its remote commit cannot
    /// be determined, or the remote commit differs from the indexed one.
    pub async fn needs_update(&self, repository: &str, git_ref: &str) -> Result<bool> {
        let record = self.db.lock().await.get_repository(repository)?;
        let Some(indexed) = record
            .filter(RepositoryRecord::has_snapshot)
            .and_then(|r| r.last_commit)
        else {
            return Ok(true);
        };

        match self
            .call_source(repository, git_ref, |s, r, g| s.current_commit(r, g))
            .await
        {
            Ok(current) => Ok(current != indexed),
            Err(e) => {
                warn!(repository, git_ref, error = %e, "cannot determine current commit");
                Ok(true)
            }
        }
    }

    /// Index `repository` at `git_ref` into a fresh snapshot.
    ///
    /// The previous snapshot stays readable until the new one commits. On any
    /// pass-level failure the new rows are dropped and the stored commit is
    /// left untouched.
    pub async fn index(&self, repository: &str, git_ref: &str) -> Result<IndexReport> {
        let lock = self.repository_lock(repository);
        let _guard = lock.lock().await;
        self.run_pass(repository, git_ref).await
    }

    /// Index only when [`needs_update`](Self::needs_update) says so.
    pub async fn ensure_indexed(
        &self,
        repository: &str,
        git_ref: &str,
    ) -> Result<Option<IndexReport>> {
        let lock = self.repository_lock(repository);
        let _guard = lock.lock().await;
        if !self.needs_update(repository, git_ref).await? {
            debug!(repository, git_ref, "index is up to date");
            return Ok(None);
        }
        self.run_pass(repository, git_ref).await.map(Some)
    }

    /// Current record, or a `NotIndexed` placeholder for unknown repositories.
    pub async fn state(&self, repository: &str) -> Result<RepositoryRecord> {
        let record = self.db.lock().await.get_repository(repository)?;
        Ok(record.unwrap_or_else(|| RepositoryRecord {
            name: repository.to_string(),
            last_commit: None,
            indexed_at: None,
            total_chunks: 0,
            current_generation: 0,
            state: IndexState::NotIndexed,
            last_error: None,
        }))
    }

    pub async fn stats(&self, repository: &str) -> Result<IndexStats> {
        self.db
            .lock()
            .await
            .repository_stats(repository)?
            .ok_or_else(|| IndexError::RepositoryNotIndexed(repository.to_string()))
    }

    pub async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        Ok(self.db.lock().await.list_repositories()?)
    }

    async fn run_pass(&self, repository: &str, git_ref: &str) -> Result<IndexReport> {
        let started = Instant::now();
        let (generation, dimensions) = {
            let mut db = self.db.lock().await;
            (db.begin_pass(repository)?, db.dimensions())
        };
        info!(repository, git_ref, generation, "index pass started");

        let outcome = self
            .write_snapshot(repository, git_ref, generation, dimensions)
            .await;

        match outcome {
            Ok(mut report) => {
                report.duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    repository,
                    commit = %report.commit,
                    generation,
                    files = report.files_indexed,
                    chunks = report.chunks_created,
                    without_embedding = report.chunks_without_embedding,
                    duration_ms = report.duration_ms,
                    "index pass committed"
                );
                Ok(report)
            }
            Err(e) => {
                error!(repository, git_ref, generation, error = %e, "index pass failed");
                if let Err(mark_err) =
                    self.db
                        .lock()
                        .await
                        .mark_failed(repository, generation, &e.to_string())
                {
                    error!(repository, error = %mark_err, "failed to record pass failure");
                }
                Err(e)
            }
        }
    }

    async fn write_snapshot(
        &self,
        repository: &str,
        git_ref: &str,
        generation: i64,
        dimensions: usize,
    ) -> Result<IndexReport> {
        let tree: SourceTree = self
            .call_source(repository, git_ref, |s, r, g| s.fetch_tree(r, g))
            .await?;

        let filter = Arc::clone(&self.filter);
        let root = tree.root.clone();
        let scan = tokio::task::spawn_blocking(move || filter.scan(&root))
            .await
            .map_err(|e| IndexError::Task(e.to_string()))?;

        let mut report = IndexReport {
            repository: repository.to_string(),
            git_ref: git_ref.to_string(),
            commit: tree.commit.clone(),
            generation,
            files_scanned: scan.files.len() + scan.skipped.len(),
            files_skipped: scan.skipped.len(),
            errors: scan.skipped.iter().map(ToString::to_string).collect(),
            ..IndexReport::default()
        };
        debug!(repository, files = scan.files.len(), skipped = scan.skipped.len(), "tree scanned");

        let ctx = Arc::new(PassContext {
            db: Arc::clone(&self.db),
            embedder: Arc::clone(&self.embedder),
            chunker: Arc::clone(&self.chunker),
            repository: repository.to_string(),
            generation,
            dimensions,
            embed_timeout: self.config.embed_timeout,
            max_embed_chars: self.config.max_embed_chars,
        });
        let semaphore = Arc::new(Semaphore::new(self.config.indexing.workers.max(1)));
        let mut join_set = JoinSet::new();

        for file in scan.files {
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| IndexError::Task(e.to_string()))?;
                match index_file(&ctx, file).await {
                    Err(e) if !e.is_fatal() => Ok(Err(e)),
                    other => other.map(Ok),
                }
            });
        }

        // All writes land before the commit point
        while let Some(joined) = join_set.join_next().await {
            let result = joined.map_err(|e| IndexError::Task(e.to_string()))??;
            match result {
                Ok(outcome) => {
                    report.files_indexed += 1;
                    report.chunks_created += outcome.written;
                    report.chunks_without_embedding += outcome.without_embedding;
                }
                Err(skipped) => {
                    warn!(repository, error = %skipped, "skipping file");
                    report.files_skipped += 1;
                    report.errors.push(skipped.to_string());
                }
            }
        }

        let total = self
            .db
            .lock()
            .await
            .commit_snapshot(repository, generation, &tree.commit)?;
        report.chunks_created = total;
        Ok(report)
    }
}

/// Read, chunk, embed and store one file.
async fn index_file(ctx: &PassContext, file: SourceFile) -> Result<FileOutcome> {
    let chunker = Arc::clone(&ctx.chunker);
    let chunks = tokio::task::spawn_blocking(move || -> Result<_> {
        let bytes = std::fs::read(&file.path).map_err(|source| IndexError::FileUnreadable {
            path: file.relative.clone().into(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|e| IndexError::FileUnreadable {
            path: file.relative.clone().into(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        let language = LanguageConfig::detect(&file.relative);
        Ok(chunker.chunk_file(&file.relative, language, &text))
    })
    .await
    .map_err(|e| IndexError::Task(e.to_string()))??;

    if chunks.is_empty() {
        return Ok(FileOutcome {
            written: 0,
            without_embedding: 0,
        });
    }

    let mut embedded = Vec::with_capacity(chunks.len());
    let mut without_embedding = 0;
    for chunk in chunks {
        let text = truncate_chars(&chunk.embedding_text(), ctx.max_embed_chars).to_string();
        let embedding = match embed_with_timeout(
            Arc::clone(&ctx.embedder),
            text,
            EmbedMode::Passage,
            ctx.embed_timeout,
        )
        .await
        {
            Ok(vector) if vector.len() == ctx.dimensions && is_usable(&vector) => Some(vector),
            Ok(vector) => {
                debug!(chunk = %chunk.id, len = vector.len(), "unusable embedding");
                None
            }
            Err(e) => {
                warn!(chunk = %chunk.id, error = %IndexError::from(e), "storing chunk without vector");
                None
            }
        };
        if embedding.is_none() {
            without_embedding += 1;
        }
        embedded.push(EmbeddedChunk { chunk, embedding });
    }

    let written = ctx
        .db
        .lock()
        .await
        .insert_file_chunks(&ctx.repository, ctx.generation, &embedded)?;
    Ok(FileOutcome {
        written,
        without_embedding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::{FailingEmbedder, MockEmbedder, SlowEmbedder};
    use crate::source::MockSourceProvider;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const DIMS: usize = 32;

    fn write_site(root: &Path) {
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(
            root.join("index.html"),
            "<html>\n<head>\n<title>Acme</title>\n</head>\n<body>\n<h1>Welcome</h1>\n</body>\n</html>\n",
        )
        .unwrap();
        fs::write(
            root.join("src/app.js"),
            "import React from 'react';\n\nexport function App() {\n  return null;\n}\n",
        )
        .unwrap();
        fs::write(root.join("package.json"), "{\n  \"name\": \"acme\"\n}\n").unwrap();
    }

    fn indexer_with(
        embedder: Arc<dyn Embedder>,
        source: Arc<MockSourceProvider>,
        config: IndexerConfig,
    ) -> Indexer {
        let db = Arc::new(TokioMutex::new(Db::open_in_memory(DIMS).unwrap()));
        Indexer::new(db, embedder, source, config).unwrap()
    }

    fn setup(root: &Path) -> (Indexer, Arc<MockSourceProvider>) {
        let source = Arc::new(MockSourceProvider::new().with_repository("acme/site", root, "c1"));
        let indexer = indexer_with(
            Arc::new(MockEmbedder::new(DIMS)),
            Arc::clone(&source),
            IndexerConfig::default(),
        );
        (indexer, source)
    }

    #[tokio::test]
    async fn test_index_and_needs_update() {
        let dir = tempdir().unwrap();
        write_site(dir.path());
        let (indexer, source) = setup(dir.path());

        assert!(indexer.needs_update("acme/site", "main").await.unwrap());
        assert_eq!(
            indexer.state("acme/site").await.unwrap().state,
            IndexState::NotIndexed
        );

        let report = indexer.index("acme/site", "main").await.unwrap();
        assert_eq!(report.commit, "c1");
        assert_eq!(report.files_indexed, 3);
        assert!(report.chunks_created > 0);
        assert_eq!(report.chunks_without_embedding, 0);
        assert!(!indexer.needs_update("acme/site", "main").await.unwrap());

        let stats = indexer.stats("acme/site").await.unwrap();
        assert_eq!(stats.total_chunks, report.chunks_created);
        assert_eq!(stats.last_commit.as_deref(), Some("c1"));
        assert!(stats.by_language.contains_key("html"));

        source.set_commit("acme/site", "c2");
        assert!(indexer.needs_update("acme/site", "main").await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_indexed_skips_fresh_index() {
        let dir = tempdir().unwrap();
        write_site(dir.path());
        let (indexer, source) = setup(dir.path());

        assert!(indexer.ensure_indexed("acme/site", "main").await.unwrap().is_some());
        assert!(indexer.ensure_indexed("acme/site", "main").await.unwrap().is_none());
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_source_failure_keeps_snapshot() {
        let dir = tempdir().unwrap();
        write_site(dir.path());
        let (indexer, source) = setup(dir.path());
        let first = indexer.index("acme/site", "main").await.unwrap();

        source.set_commit("acme/site", "c2");
        source.set_unavailable("acme/site", true);
        let err = indexer.index("acme/site", "main").await.unwrap_err();
        assert!(matches!(err, IndexError::SourceUnavailable { .. }));

        let record = indexer.state("acme/site").await.unwrap();
        assert_eq!(record.state, IndexState::Failed);
        assert_eq!(record.last_commit.as_deref(), Some("c1"));
        assert!(record.last_error.is_some());
        let stats = indexer.stats("acme/site").await.unwrap();
        assert_eq!(stats.total_chunks, first.chunks_created);
    }

    #[tokio::test]
    async fn test_fetch_timeout_fails_pass() {
        let dir = tempdir().unwrap();
        write_site(dir.path());
        let source = Arc::new(
            MockSourceProvider::new()
                .with_repository("acme/site", dir.path(), "c1")
                .with_delay(Duration::from_millis(300)),
        );
        let config = IndexerConfig {
            fetch_timeout: Duration::from_millis(20),
            ..IndexerConfig::default()
        };
        let indexer = indexer_with(Arc::new(MockEmbedder::new(DIMS)), source, config);

        let err = indexer.index("acme/site", "main").await.unwrap_err();
        assert!(matches!(err, IndexError::SourceUnavailable { .. }));
        assert!(matches!(
            indexer.stats("acme/site").await,
            Err(IndexError::RepositoryNotIndexed(_))
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_not_fatal() {
        let dir = tempdir().unwrap();
        write_site(dir.path());
        let source = Arc::new(MockSourceProvider::new().with_repository("acme/site", dir.path(), "c1"));
        let indexer = indexer_with(
            Arc::new(FailingEmbedder::new(DIMS)),
            source,
            IndexerConfig::default(),
        );

        let report = indexer.index("acme/site", "main").await.unwrap();
        assert!(report.chunks_created > 0);
        assert_eq!(report.chunks_without_embedding, report.chunks_created);
        let stats = indexer.stats("acme/site").await.unwrap();
        assert_eq!(stats.chunks_with_embedding, 0);
    }

    #[tokio::test]
    async fn test_embedding_timeout_is_not_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.md"), "# Notes\nshort\n").unwrap();
        let source = Arc::new(MockSourceProvider::new().with_repository("acme/site", dir.path(), "c1"));
        let config = IndexerConfig {
            embed_timeout: Duration::from_millis(10),
            ..IndexerConfig::default()
        };
        let indexer = indexer_with(
            Arc::new(SlowEmbedder::new(DIMS, Duration::from_millis(200))),
            source,
            config,
        );

        let report = indexer.index("acme/site", "main").await.unwrap();
        assert_eq!(report.chunks_created, 1);
        assert_eq!(report.chunks_without_embedding, 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let dir = tempdir().unwrap();
        write_site(dir.path());
        fs::write(dir.path().join("broken.js"), [0xff, 0xfe, 0x00, 0x41]).unwrap();
        let (indexer, _) = setup(dir.path());

        let report = indexer.index("acme/site", "main").await.unwrap();
        assert_eq!(report.files_indexed, 3);
        assert_eq!(report.files_skipped, 1);
        assert!(report.errors[0].contains("broken.js"));
    }

    #[tokio::test]
    async fn test_concurrent_passes_do_not_interleave() {
        let dir = tempdir().unwrap();
        write_site(dir.path());
        let source = Arc::new(
            MockSourceProvider::new()
                .with_repository("acme/site", dir.path(), "c1")
                .with_delay(Duration::from_millis(50)),
        );
        let indexer = Arc::new(indexer_with(
            Arc::new(MockEmbedder::new(DIMS)),
            Arc::clone(&source),
            IndexerConfig::default(),
        ));

        let a = tokio::spawn({
            let indexer = Arc::clone(&indexer);
            async move { indexer.index("acme/site", "main").await }
        });
        let b = tokio::spawn({
            let indexer = Arc::clone(&indexer);
            async move { indexer.index("acme/site", "main").await }
        });
        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

        assert_eq!(source.fetch_count(), 2);
        assert_eq!(source.max_concurrent_fetches(), 1);
        assert_eq!(a.chunks_created, b.chunks_created);
        let stats = indexer.stats("acme/site").await.unwrap();
        assert_eq!(stats.total_chunks, a.chunks_created);
    }
}
