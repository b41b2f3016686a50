//! Enumerates the files of a source tree eligible for indexing.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::config::IndexingConfig;
use crate::error::{IndexError, Result};

/// A file selected for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the tree root, `/`-separated.
    pub relative: String,
    pub size: u64,
}

/// Outcome of walking a tree.
#[derive(Debug, Default)]
pub struct FileScan {
    pub files: Vec<SourceFile>,
    /// Files that matched the filters but were rejected (size ceiling).
    pub skipped: Vec<IndexError>,
}

/// Extension allow-list, manifest names, excluded directories and globs.
pub struct FileFilter {
    extensions: HashSet<String>,
    manifests: HashSet<String>,
    excluded_dirs: HashSet<String>,
    excludes: GlobSet,
    max_file_bytes: u64,
}

impl FileFilter {
    pub fn from_config(cfg: &IndexingConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &cfg.exclude_globs {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            extensions: cfg
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            manifests: cfg.manifest_files.iter().cloned().collect(),
            excluded_dirs: cfg.excluded_dirs.iter().cloned().collect(),
            excludes: builder.build()?,
            max_file_bytes: cfg.max_file_bytes,
        })
    }

    pub fn is_manifest(&self, relative: &str) -> bool {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        self.manifests.contains(name)
    }

    /// Whether a relative path passes the name-based filters.
    pub fn accepts(&self, relative: &str) -> bool {
        if relative
            .split('/')
            .rev()
            .skip(1)
            .any(|dir| self.excluded_dirs.contains(dir))
        {
            return false;
        }
        if self.excludes.is_match(relative) {
            return false;
        }
        if self.is_manifest(relative) {
            return true;
        }
        Path::new(relative)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&e.to_ascii_lowercase()))
    }

    /// Walk `root` and collect eligible files, sorted by relative path.
    pub fn scan(&self, root: &Path) -> FileScan {
        let excluded = self.excluded_dirs.clone();
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| excluded.contains(name)))
            })
            .build();

        let mut scan = FileScan::default();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "walk error");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if !self.accepts(&relative) {
                continue;
            }

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!(file = %relative, error = %e, "cannot stat file");
                    continue;
                }
            };
            if size > self.max_file_bytes {
                warn!(file = %relative, size, limit = self.max_file_bytes, "skipping oversized file");
                scan.skipped.push(IndexError::FileTooLarge {
                    path: PathBuf::from(&relative),
                    size,
                    limit: self.max_file_bytes,
                });
                continue;
            }

            debug!(file = %relative, size, "eligible");
            scan.files.push(SourceFile {
                path: path.to_path_buf(),
                relative,
                size,
            });
        }

        scan.files.sort_by(|a, b| a.relative.cmp(&b.relative));
        scan
    }
}
