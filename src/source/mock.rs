//! In-memory source provider over local directories, for tests and offline use.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{SourceError, SourceProvider, SourceTree};

#[derive(Debug, Clone)]
struct Entry {
    root: PathBuf,
    commit: String,
    unavailable: bool,
}

/// Serves fixed directories as repository trees.
#[derive(Default)]
pub struct MockSourceProvider {
    repos: Mutex<HashMap<String, Entry>>,
    delay: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fetches: AtomicUsize,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockSourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(
        self,
        name: impl Into<String>,
        root: impl AsRef<Path>,
        commit: impl Into<String>,
    ) -> Self {
        self.insert(name.into(), root.as_ref().to_path_buf(), commit.into());
        self
    }

    /// Sleep inside every fetch, to widen race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn insert(&self, name: String, root: PathBuf, commit: String) {
        if let Ok(mut repos) = self.repos.lock() {
            repos.insert(
                name,
                Entry {
                    root,
                    commit,
                    unavailable: false,
                },
            );
        }
    }

    /// Simulate a new commit landing on the remote.
    pub fn set_commit(&self, name: &str, commit: impl Into<String>) {
        if let Ok(mut repos) = self.repos.lock() {
            if let Some(entry) = repos.get_mut(name) {
                entry.commit = commit.into();
            }
        }
    }

    pub fn set_unavailable(&self, name: &str, unavailable: bool) {
        if let Ok(mut repos) = self.repos.lock() {
            if let Some(entry) = repos.get_mut(name) {
                entry.unavailable = unavailable;
            }
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn entry(&self, repository: &str) -> Result<Entry, SourceError> {
        let repos = self
            .repos
            .lock()
            .map_err(|_| SourceError::Unavailable("provider state poisoned".to_string()))?;
        let entry = repos
            .get(repository)
            .cloned()
            .ok_or_else(|| SourceError::Unavailable(format!("unknown repository {repository}")))?;
        if entry.unavailable {
            return Err(SourceError::Unavailable(format!("{repository} is offline")));
        }
        Ok(entry)
    }
}

impl SourceProvider for MockSourceProvider {
    fn current_commit(&self, repository: &str, _git_ref: &str) -> Result<String, SourceError> {
        Ok(self.entry(repository)?.commit)
    }

    fn fetch_tree(&self, repository: &str, _git_ref: &str) -> Result<SourceTree, SourceError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let entry = self.entry(repository)?;
        Ok(SourceTree {
            root: entry.root,
            commit: entry.commit,
        })
    }
}
