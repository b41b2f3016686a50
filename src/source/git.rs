//! Source provider backed by the `git` command line.
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::{SourceError, SourceProvider, SourceTree};

/// Fetches shallow, detached checkouts into a cache directory.
pub struct GitSourceProvider {
    url_template: String,
    checkout_dir: PathBuf,
}

impl GitSourceProvider {
    /// `url_template` contains `{repository}`, e.g. `https://github.com/{repository}.git`.
    pub fn new(url_template: impl Into<String>, checkout_dir: impl Into<PathBuf>) -> Self {
        Self {
            url_template: url_template.into(),
            checkout_dir: checkout_dir.into(),
        }
    }

    pub fn remote_url(&self, repository: &str) -> String {
        self.url_template.replace("{repository}", repository)
    }

    /// Working copy location for a repository.
    pub fn checkout_path(&self, repository: &str) -> PathBuf {
        let safe: String = repository
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.checkout_dir.join(safe)
    }

    /// Check if git is available in PATH.
    pub fn check_git_available() -> Result<(), SourceError> {
        match Command::new("git").arg("--version").output() {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(SourceError::CommandFailed {
                command: "git --version".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Err(_) => Err(SourceError::GitNotFound),
        }
    }
}

fn git(dir: Option<&Path>, args: &[&str]) -> Result<String, SourceError> {
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    // Never block on a credential prompt
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    debug!(args = ?args, "running git");

    let output = cmd.args(args).output().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SourceError::GitNotFound,
        _ => SourceError::Io(e),
    })?;
    if !output.status.success() {
        return Err(SourceError::CommandFailed {
            command: format!("git {}", args.join(" ")),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Refs are passed to git as positional arguments; anything that could be
/// read as an option is refused.
fn check_ref(repository: &str, git_ref: &str) -> Result<(), SourceError> {
    if git_ref.is_empty() || git_ref.starts_with('-') || git_ref.chars().any(char::is_control) {
        return Err(SourceError::RefNotFound {
            repository: repository.to_string(),
            git_ref: git_ref.to_string(),
        });
    }
    Ok(())
}

fn is_commit_id(git_ref: &str) -> bool {
    git_ref.len() == 40 && git_ref.chars().all(|c| c.is_ascii_hexdigit())
}

/// Pick the commit for `git_ref` out of `git ls-remote` output, preferring
/// the peeled entry of an annotated tag.
pub fn parse_ls_remote(output: &str, git_ref: &str) -> Option<String> {
    let entries: Vec<(&str, &str)> = output
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .collect();
    let peeled = format!("refs/tags/{git_ref}^{{}}");
    entries
        .iter()
        .find(|(_, name)| *name == peeled)
        .or_else(|| entries.first())
        .map(|(sha, _)| sha.to_string())
}

impl SourceProvider for GitSourceProvider {
    fn current_commit(&self, repository: &str, git_ref: &str) -> Result<String, SourceError> {
        check_ref(repository, git_ref)?;
        if is_commit_id(git_ref) {
            return Ok(git_ref.to_lowercase());
        }
        let url = self.remote_url(repository);
        let output = git(None, &["ls-remote", "--end-of-options", &url, git_ref])?;
        parse_ls_remote(&output, git_ref).ok_or_else(|| SourceError::RefNotFound {
            repository: repository.to_string(),
            git_ref: git_ref.to_string(),
        })
    }

    fn fetch_tree(&self, repository: &str, git_ref: &str) -> Result<SourceTree, SourceError> {
        check_ref(repository, git_ref)?;
        let url = self.remote_url(repository);
        let dir = self.checkout_path(repository);

        if dir.join(".git").exists() {
            git(Some(&dir), &["remote", "set-url", "origin", &url])?;
        } else {
            fs::create_dir_all(&dir)?;
            git(Some(&dir), &["init", "-q"])?;
            git(Some(&dir), &["remote", "add", "origin", &url])?;
        }

        info!(repository, git_ref, dir = %dir.display(), "fetching source tree");
        git(Some(&dir), &["fetch", "-q", "--depth", "1", "--end-of-options", "origin", git_ref])?;
        git(Some(&dir), &["checkout", "-q", "--force", "--detach", "FETCH_HEAD"])?;
        git(Some(&dir), &["clean", "-q", "-ffdx"])?;
        let commit = git(Some(&dir), &["rev-parse", "HEAD"])?;

        Ok(SourceTree { root: dir, commit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_url() {
        let p = GitSourceProvider::new("https://github.com/{repository}.git", "/tmp/x");
        assert_eq!(p.remote_url("acme/site"), "https://github.com/acme/site.git");
        assert_eq!(p.checkout_path("acme/site"), PathBuf::from("/tmp/x/acme_site"));
    }

    #[test]
    fn test_parse_ls_remote() {
        let out = "1111111111111111111111111111111111111111\trefs/tags/v1\n2222222222222222222222222222222222222222\trefs/tags/v1^{}\n";
        assert_eq!(
            parse_ls_remote(out, "v1").as_deref(),
            Some("2222222222222222222222222222222222222222")
        );
        let out = "3333333333333333333333333333333333333333\tHEAD\n";
        assert_eq!(
            parse_ls_remote(out, "HEAD").as_deref(),
            Some("3333333333333333333333333333333333333333")
        );
        assert!(parse_ls_remote("", "main").is_none());
    }

    #[test]
    fn test_option_like_ref_rejected() {
        let marker = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let provider = GitSourceProvider::new("/nonexistent/{repository}", cache.path());
        let hostile = format!(
            "--upload-pack=touch {}/created;git-upload-pack",
            marker.path().display()
        );

        for git_ref in [hostile.as_str(), "-q", "", "main\n--force"] {
            assert!(matches!(
                provider.current_commit("acme/site", git_ref),
                Err(SourceError::RefNotFound { .. })
            ));
            assert!(matches!(
                provider.fetch_tree("acme/site", git_ref),
                Err(SourceError::RefNotFound { .. })
            ));
        }
        assert!(!marker.path().join("created").exists());
        assert!(!provider.checkout_path("acme/site").exists());
    }

    #[test]
    fn test_commit_id_passthrough() {
        let p = GitSourceProvider::new("file:///nonexistent/{repository}", "/tmp/x");
        let sha = "ABCDEF0123456789abcdef0123456789abcdef01";
        assert_eq!(p.current_commit("acme/site", sha).unwrap(), sha.to_lowercase());
    }

    /// Round trip against a local repository; skipped when git is missing.
    #[test]
    fn test_fetch_local_repository() {
        if GitSourceProvider::check_git_available().is_err() {
            return;
        }
        let remote = tempfile::tempdir().unwrap();
        let origin = remote.path().join("acme").join("site");
        fs::create_dir_all(&origin).unwrap();
        fs::write(origin.join("index.html"), "<title>Hi</title>").unwrap();
        let setup: &[&[&str]] = &[
            &["init", "-q"],
            &["add", "."],
            &[
                "-c",
                "user.name=t",
                "-c",
                "user.email=t@example.com",
                "commit",
                "-q",
                "-m",
                "init",
            ],
        ];
        for args in setup {
            if git(Some(&origin), args).is_err() {
                return;
            }
        }
        let expected = git(Some(&origin), &["rev-parse", "HEAD"]).unwrap();

        let cache = tempfile::tempdir().unwrap();
        let template = format!("{}/{{repository}}", remote.path().display());
        let provider = GitSourceProvider::new(template, cache.path());

        assert_eq!(provider.current_commit("acme/site", "HEAD").unwrap(), expected);
        let tree = provider.fetch_tree("acme/site", "HEAD").unwrap();
        assert_eq!(tree.commit, expected);
        assert!(tree.root.join("index.html").exists());
    }

    #[test]
    fn test_missing_remote_fails() {
        if GitSourceProvider::check_git_available().is_err() {
            return;
        }
        let cache = tempfile::tempdir().unwrap();
        let provider = GitSourceProvider::new("/nonexistent/{repository}", cache.path());
        assert!(provider.current_commit("acme/site", "HEAD").is_err());
    }
}
