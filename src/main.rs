use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coderank::config::Config;
use coderank::db::Db;
use coderank::embedder::Embedder;
use coderank::search::render_context;
use coderank::source::{GitSourceProvider, SourceProvider};
use coderank::{Indexer, IndexerConfig, QueryEngine};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Repository code search: index a repository, then ask it task questions.
#[derive(Parser)]
#[command(name = "coderank", version, about)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a repository if its remote commit changed
    Index {
        /// Repository name, e.g. owner/name
        repository: String,
        #[arg(long = "ref", default_value = "HEAD")]
        git_ref: String,
        /// Re-index even when the stored commit is current
        #[arg(long)]
        force: bool,
    },
    /// Search a repository's index
    Search {
        repository: String,
        query: String,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Bring the index up to date before searching
        #[arg(long = "ref")]
        git_ref: Option<String>,
        /// Print a prompt-ready context block instead of JSON
        #[arg(long)]
        context: bool,
        /// Character budget for --context output
        #[arg(long, default_value = "12000")]
        max_chars: usize,
    },
    /// Show index state and whether the repository needs re-indexing
    Status {
        repository: String,
        #[arg(long = "ref", default_value = "HEAD")]
        git_ref: String,
    },
    /// Chunk counts by kind and language for the current snapshot
    Stats { repository: String },
    /// List all known repositories
    List,
}

#[derive(Serialize)]
struct StatusReport {
    #[serde(flatten)]
    record: coderank::db::RepositoryRecord,
    needs_update: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(feature = "onnx")]
fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    use coderank::embedder::{download, onnx::OnnxEmbedder};
    let model_dir = std::path::Path::new(&config.model.model_dir);
    download::ensure_model_files(&config.model.name, model_dir)?;
    let embedder = OnnxEmbedder::new(model_dir, config.model.dimensions)
        .context("failed to load embedding model")?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "onnx"))]
fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    use coderank::embedder::mock::MockEmbedder;
    info!("built without the onnx feature, using hashing embedder");
    Ok(Arc::new(MockEmbedder::new(config.model.dimensions)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries JSON
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = Config::load(&cli.config)?;
    config.validate()?;

    let embedder = build_embedder(&config)?;
    let db = Db::open(&config.db_path, embedder.dimensions())
        .with_context(|| format!("failed to open database: {}", config.db_path))?;
    let db = Arc::new(TokioMutex::new(db));

    let checkout_dir = config.checkout_dir();
    std::fs::create_dir_all(&checkout_dir)
        .with_context(|| format!("failed to create {}", checkout_dir.display()))?;
    let source: Arc<dyn SourceProvider> = Arc::new(GitSourceProvider::new(
        config.source.remote_url_template.clone(),
        checkout_dir,
    ));

    let indexer = Indexer::new(
        Arc::clone(&db),
        Arc::clone(&embedder),
        source,
        IndexerConfig::from_config(&config),
    )?;

    match cli.command {
        Command::Index {
            repository,
            git_ref,
            force,
        } => {
            let report = if force {
                Some(indexer.index(&repository, &git_ref).await?)
            } else {
                indexer.ensure_indexed(&repository, &git_ref).await?
            };
            match report {
                Some(report) => print_json(&report)?,
                None => {
                    info!(%repository, "already up to date");
                    print_json(&indexer.state(&repository).await?)?;
                }
            }
        }
        Command::Search {
            repository,
            query,
            limit,
            git_ref,
            context,
            max_chars,
        } => {
            if let Some(git_ref) = git_ref {
                indexer.ensure_indexed(&repository, &git_ref).await?;
            }
            let engine = QueryEngine::new(
                db,
                embedder,
                config.search.clone(),
                &config.indexing.manifest_files,
                config.model.embed_timeout(),
            );
            let limit = limit.unwrap_or(config.search.default_limit);
            let results = engine.search(&repository, &query, limit).await?;
            if context {
                print!("{}", render_context(&results, max_chars));
            } else {
                print_json(&results)?;
            }
        }
        Command::Status {
            repository,
            git_ref,
        } => {
            let record = indexer.state(&repository).await?;
            let needs_update = indexer.needs_update(&repository, &git_ref).await?;
            print_json(&StatusReport {
                record,
                needs_update,
            })?;
        }
        Command::Stats { repository } => {
            print_json(&indexer.stats(&repository).await?)?;
        }
        Command::List => {
            print_json(&indexer.list_repositories().await?)?;
        }
    }

    Ok(())
}
