//! Error types for indexing and search.

use std::path::PathBuf;

use crate::embedder::EmbedderError;

/// Errors surfaced by the indexer and query engine.
///
/// File- and chunk-level kinds (`FileTooLarge`, `FileUnreadable`,
/// `EmbeddingUnavailable`) are absorbed inside an index pass; the rest fail
/// the current operation.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Repository or ref could not be fetched (or the fetch timed out).
    #[error("source unavailable for {repository}@{git_ref}: {reason}")]
    SourceUnavailable {
        repository: String,
        git_ref: String,
        reason: String,
    },

    /// Embedding generation failed for one chunk.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(#[from] EmbedderError),

    /// File exceeds the configured size ceiling.
    #[error("file too large: {} ({size} bytes, limit {limit})", path.display())]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// File could not be read or is not valid UTF-8.
    #[error("file unreadable: {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Repository has no committed snapshot.
    #[error("repository not indexed: {0}")]
    RepositoryNotIndexed(String),

    /// SQLite failure.
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file filter pattern.
    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// A worker task panicked or was cancelled.
    #[error("indexing task failed: {0}")]
    Task(String),
}

impl IndexError {
    /// Whether this error aborts an index pass rather than a single file.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::FileTooLarge { .. } | Self::FileUnreadable { .. } | Self::EmbeddingUnavailable(_)
        )
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_level_errors_are_not_fatal() {
        let err = IndexError::FileTooLarge {
            path: PathBuf::from("big.js"),
            size: 10,
            limit: 5,
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("big.js"));

        let err = IndexError::EmbeddingUnavailable(EmbedderError::Timeout(50));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_pass_level_errors_are_fatal() {
        let err = IndexError::SourceUnavailable {
            repository: "acme/site".to_string(),
            git_ref: "main".to_string(),
            reason: "timed out".to_string(),
        };
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "source unavailable for acme/site@main: timed out"
        );
        assert!(IndexError::Storage(rusqlite::Error::InvalidQuery).is_fatal());
    }
}
