/// Embedder trait and shared types for text embedding.
///
/// Providers are synchronous; async callers go through [`embed_with_timeout`],
/// which moves the call onto the blocking pool and bounds it in time.
pub mod mock;

#[cfg(feature = "onnx")]
pub mod download;
#[cfg(feature = "onnx")]
pub mod onnx;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    /// The provider did not answer within the deadline (milliseconds).
    #[error("embedding timed out after {0} ms")]
    Timeout(u64),

    #[error("embedding task failed: {0}")]
    TaskFailed(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a passage (chunk text) into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed a search query. Models trained with asymmetric prefixes override this.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed(text)
    }

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Which side of the retrieval pair a text is embedded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    Passage,
    Query,
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// A vector is usable when it is non-empty, finite and not all zeros.
pub fn is_usable(vector: &[f32]) -> bool {
    !vector.is_empty()
        && vector.iter().all(|v| v.is_finite())
        && vector.iter().any(|&v| v != 0.0)
}

/// Run one embedding call on the blocking pool, bounded by `timeout`.
pub async fn embed_with_timeout(
    embedder: Arc<dyn Embedder>,
    text: String,
    mode: EmbedMode,
    timeout: Duration,
) -> Result<Vec<f32>, EmbedderError> {
    let task = tokio::task::spawn_blocking(move || match mode {
        EmbedMode::Passage => embedder.embed(&text),
        EmbedMode::Query => embedder.embed_query(&text),
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(EmbedderError::TaskFailed(join_err.to_string())),
        Err(_) => Err(EmbedderError::Timeout(timeout.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::{FailingEmbedder, MockEmbedder, SlowEmbedder};

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_is_usable() {
        assert!(is_usable(&[0.0, 1.0]));
        assert!(!is_usable(&[0.0, 0.0]));
        assert!(!is_usable(&[]));
        assert!(!is_usable(&[f32::NAN, 1.0]));
    }

    #[tokio::test]
    async fn test_embed_with_timeout_ok() {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(16));
        let v = embed_with_timeout(
            embedder,
            "hello".to_string(),
            EmbedMode::Passage,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(v.len(), 16);
    }

    #[tokio::test]
    async fn test_embed_with_timeout_expires() {
        let embedder: Arc<dyn Embedder> =
            Arc::new(SlowEmbedder::new(16, Duration::from_millis(500)));
        let err = embed_with_timeout(
            embedder,
            "hello".to_string(),
            EmbedMode::Query,
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EmbedderError::Timeout(20)));
    }

    #[tokio::test]
    async fn test_embed_with_timeout_propagates_failure() {
        let embedder: Arc<dyn Embedder> = Arc::new(FailingEmbedder::new(16));
        let err = embed_with_timeout(
            embedder,
            "hello".to_string(),
            EmbedMode::Passage,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EmbedderError::InferenceFailed(_)));
    }
}
