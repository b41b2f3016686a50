/// Deterministic embedders for tests and offline use.
///
/// `MockEmbedder` hashes each token into a fixed-size bucket vector, so texts
/// that share vocabulary end up with a positive cosine similarity.
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use super::{Embedder, EmbedderError};
use crate::indexer::terms::tokenize;

/// A feature-hashing bag-of-words embedder.
///
/// Useful for testing without loading a real ONNX model.
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut embedding = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return Ok(embedding);
        }

        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();
            let bucket = (hash % self.dimensions as u64) as usize;
            // High bit picks the sign so unrelated tokens partially cancel
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        // L2 normalize
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// An embedder whose every call fails.
pub struct FailingEmbedder {
    dimensions: usize,
}

impl FailingEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
        Err(EmbedderError::InferenceFailed(
            "embedding provider offline".to_string(),
        ))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Wraps [`MockEmbedder`] and sleeps before answering.
pub struct SlowEmbedder {
    inner: MockEmbedder,
    delay: Duration,
}

impl SlowEmbedder {
    #[must_use]
    pub fn new(dimensions: usize, delay: Duration) -> Self {
        Self {
            inner: MockEmbedder::new(dimensions),
            delay,
        }
    }
}

impl Embedder for SlowEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        std::thread::sleep(self.delay);
        self.inner.embed(text)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_mock_embed_dimensions() {
        let embedder = MockEmbedder::new(384);
        let result = embedder.embed("hello world").unwrap();
        assert_eq!(result.len(), 384);
    }

    #[test]
    fn test_mock_embed_deterministic() {
        let embedder = MockEmbedder::new(384);
        let a = embedder.embed("hello").unwrap();
        let b = embedder.embed("hello").unwrap();
        assert_eq!(a, b, "same input should produce same output");
    }

    #[test]
    fn test_mock_embed_different_inputs() {
        let embedder = MockEmbedder::new(384);
        let a = embedder.embed("hello").unwrap();
        let b = embedder.embed("world").unwrap();
        assert_ne!(a, b, "different inputs should produce different outputs");
    }

    #[test]
    fn test_mock_embed_normalized() {
        let embedder = MockEmbedder::new(384);
        let vec = embedder.embed("test normalization").unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(
            (norm - 1.0).abs() < 0.01,
            "vector should be approximately unit length, got {norm}"
        );
    }

    #[test]
    fn test_mock_shared_vocabulary_is_similar() {
        let embedder = MockEmbedder::new(384);
        let a = embedder.embed("navigation header menu").unwrap();
        let b = embedder.embed("site header with navigation links").unwrap();
        let c = embedder.embed("database migration script").unwrap();
        assert!(cosine(&a, &b) > cosine(&a, &c));
        assert!(cosine(&a, &b) > 0.3);
    }

    #[test]
    fn test_mock_empty_text_is_zero_vector() {
        let embedder = MockEmbedder::new(8);
        let vec = embedder.embed("  ").unwrap();
        assert!(vec.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_mock_default_dimensions() {
        let embedder = MockEmbedder::default();
        assert_eq!(embedder.dimensions(), 384);
    }

    #[test]
    fn test_failing_embedder() {
        let embedder = FailingEmbedder::new(8);
        assert!(embedder.embed("x").is_err());
        assert!(embedder.embed_query("x").is_err());
        assert_eq!(embedder.dimensions(), 8);
    }
}
