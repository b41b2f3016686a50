/// Configuration module for coderank.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./coderank.db".to_string()
}

fn default_extensions() -> Vec<String> {
    [
        "html", "htm", "vue", "svelte", "js", "jsx", "mjs", "cjs", "ts", "tsx", "md", "mdx",
        "css", "scss", "json", "yml", "yaml", "toml", "py", "rs", "go", "java", "rb", "php",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_manifest_files() -> Vec<String> {
    [
        "package.json",
        "Cargo.toml",
        "pyproject.toml",
        "requirements.txt",
        "go.mod",
        "composer.json",
        "Gemfile",
        "pom.xml",
        "build.gradle",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_excluded_dirs() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "dist",
        "build",
        "target",
        "out",
        ".next",
        ".nuxt",
        "vendor",
        "coverage",
        "__pycache__",
        ".venv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_globs() -> Vec<String> {
    vec![
        "**/*.min.js".to_string(),
        "**/*.map".to_string(),
        "**/package-lock.json".to_string(),
    ]
}

fn default_max_file_bytes() -> u64 {
    512 * 1024
}

fn default_fallback_window() -> usize {
    50
}

fn default_lookahead() -> usize {
    10
}

fn default_display_chars() -> usize {
    80
}

fn default_context_chars() -> usize {
    200
}

fn default_workers() -> usize {
    4
}

fn default_limit() -> usize {
    10
}

fn default_lexical_ceiling() -> f64 {
    10.0
}

fn default_min_score() -> f64 {
    0.1
}

fn default_min_similarity() -> f32 {
    0.1
}

fn default_candidate_limit() -> usize {
    200
}

fn default_lexical_significance() -> f64 {
    0.05
}

fn default_vector_significance() -> f64 {
    0.3
}

fn default_ui_keywords() -> Vec<String> {
    [
        "ui", "header", "nav", "navbar", "navigation", "menu", "title", "heading", "button",
        "footer", "sidebar", "layout", "page", "logo", "banner", "hero", "style", "color",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_remote_url_template() -> String {
    "https://github.com/{repository}.git".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    300
}

fn default_model_name() -> String {
    "multilingual-e5-small".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_model_dir() -> String {
    "models/multilingual-e5-small".to_string()
}

fn default_embed_timeout_ms() -> u64 {
    10_000
}

fn default_max_embed_chars() -> usize {
    512
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// File extensions eligible for indexing (without the dot).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Project manifests indexed regardless of extension.
    #[serde(default = "default_manifest_files")]
    pub manifest_files: Vec<String>,

    /// Directory names never descended into.
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,

    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,

    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default = "default_fallback_window")]
    pub fallback_window_lines: usize,

    #[serde(default = "default_lookahead")]
    pub lookahead_lines: usize,

    /// Maximum length of an element symbol's display name.
    #[serde(default = "default_display_chars")]
    pub display_chars: usize,

    /// Maximum length of a symbol's context snippet.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,

    /// Files prepared concurrently within one pass.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub lexical: f64,
    pub vector: f64,
    pub structural: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct StructuralWeights {
    /// Score per matching symbol.
    pub base: f64,
    /// Element matches when the query names navigation-like parts.
    pub navigation_element: f64,
    /// Function matches when the query mentions functions.
    pub function: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BoostConfig {
    /// Bonus per quoted phrase found verbatim in a chunk.
    pub quoted_text: f64,
    /// Bonus for markup/page files when the query reads as a UI change.
    pub ui_markup: f64,
    /// Bonus that keeps project manifests in every result set.
    pub essential_config: f64,
    #[serde(default = "default_ui_keywords")]
    pub ui_keywords: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default)]
    pub weights: FusionWeights,

    /// Assumed ceiling of raw BM25 scores, used for normalization.
    #[serde(default = "default_lexical_ceiling")]
    pub lexical_ceiling: f64,

    /// Results scoring at or below this are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    /// Vector hits at or below this cosine similarity are ignored.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Maximum hits taken from each signal before fusion.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    /// Normalized lexical score needed to mention a text match in the reason.
    #[serde(default = "default_lexical_significance")]
    pub lexical_significance: f64,

    /// Similarity needed to mention semantic similarity in the reason.
    #[serde(default = "default_vector_significance")]
    pub vector_significance: f64,

    #[serde(default)]
    pub structural: StructuralWeights,

    #[serde(default)]
    pub boosts: BoostConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    /// Remote URL for a repository name; `{repository}` is substituted.
    #[serde(default = "default_remote_url_template")]
    pub remote_url_template: String,

    /// Where working copies are kept. Defaults to the user cache directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_dir: Option<String>,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,

    /// Chunk text is truncated to this many characters before embedding.
    #[serde(default = "default_max_embed_chars")]
    pub max_embed_chars: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            indexing: IndexingConfig::default(),
            search: SearchConfig::default(),
            source: SourceConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            manifest_files: default_manifest_files(),
            excluded_dirs: default_excluded_dirs(),
            exclude_globs: default_exclude_globs(),
            max_file_bytes: default_max_file_bytes(),
            fallback_window_lines: default_fallback_window(),
            lookahead_lines: default_lookahead(),
            display_chars: default_display_chars(),
            context_chars: default_context_chars(),
            workers: default_workers(),
        }
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            lexical: 0.3,
            vector: 0.4,
            structural: 0.3,
        }
    }
}

impl Default for StructuralWeights {
    fn default() -> Self {
        Self {
            base: 0.5,
            navigation_element: 1.0,
            function: 0.8,
        }
    }
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            quoted_text: 2.0,
            ui_markup: 1.0,
            essential_config: 0.2,
            ui_keywords: default_ui_keywords(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            weights: FusionWeights::default(),
            lexical_ceiling: default_lexical_ceiling(),
            min_score: default_min_score(),
            min_similarity: default_min_similarity(),
            candidate_limit: default_candidate_limit(),
            lexical_significance: default_lexical_significance(),
            vector_significance: default_vector_significance(),
            structural: StructuralWeights::default(),
            boosts: BoostConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            remote_url_template: default_remote_url_template(),
            checkout_dir: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dimensions: default_dimensions(),
            model_dir: default_model_dir(),
            embed_timeout_ms: default_embed_timeout_ms(),
            max_embed_chars: default_max_embed_chars(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template file for the default path.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let indexing = &self.indexing;
        anyhow::ensure!(
            indexing.fallback_window_lines > 0,
            "indexing.fallback_window_lines must be positive"
        );
        anyhow::ensure!(indexing.workers > 0, "indexing.workers must be positive");
        anyhow::ensure!(
            indexing.max_file_bytes > 0,
            "indexing.max_file_bytes must be positive"
        );
        anyhow::ensure!(
            !indexing.extensions.is_empty(),
            "at least one extension must be indexed"
        );

        let search = &self.search;
        let w = search.weights;
        anyhow::ensure!(
            w.lexical >= 0.0 && w.vector >= 0.0 && w.structural >= 0.0,
            "search.weights must be non-negative"
        );
        anyhow::ensure!(
            search.lexical_ceiling > 0.0,
            "search.lexical_ceiling must be positive"
        );
        anyhow::ensure!(search.default_limit > 0, "search.default_limit must be positive");

        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            self.model.max_embed_chars > 0,
            "model.max_embed_chars must be positive"
        );
        anyhow::ensure!(
            self.source.remote_url_template.contains("{repository}"),
            "source.remote_url_template must contain {{repository}}"
        );
        Ok(())
    }

    /// Directory holding working copies fetched by the git source provider.
    #[must_use]
    pub fn checkout_dir(&self) -> PathBuf {
        match &self.source.checkout_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("coderank")
                .join("checkouts"),
        }
    }
}

impl SourceConfig {
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl ModelConfig {
    #[must_use]
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
