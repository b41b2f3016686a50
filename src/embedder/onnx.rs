/// ONNX Runtime embedder for e5-family sentence models.
///
/// Passages and queries are prefixed (`passage: ` / `query: `) as the e5
/// models expect, tokenized with the HuggingFace tokenizer, mean pooled over
/// the attention mask and L2-normalized.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use super::{EmbedMode, Embedder, EmbedderError};

const MAX_TOKENS: usize = 512;

/// ONNX-backed embedder implementing the `Embedder` trait.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn new(model_dir: &Path, dimensions: usize) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");
        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        let tokenizer_path = model_dir.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedderError::TokenizerError(format!("failed to load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| EmbedderError::TokenizerError(format!("truncation config: {e}")))?;

        info!(model = %model_path.display(), "Initializing ONNX Runtime");

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        info!(
            vocab = tokenizer.get_vocab_size(false),
            dimensions, "ONNX embedder ready"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }

    fn run(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>, EmbedderError> {
        let input = prefixed(text, mode);
        let encoding = self
            .tokenizer
            .encode(input, true)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let seq_len = input_ids.len();
        debug!(seq_len, "tokenized input");

        let input_ids_val = Tensor::from_array(([1usize, seq_len], input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val = Tensor::from_array(([1usize, seq_len], attention_mask.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids_val = Tensor::from_array(([1usize, seq_len], vec![0i64; seq_len]))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(e.to_string()))?;

        // [1, seq_len, hidden]
        let (_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let pooled = mean_pooling(hidden, &attention_mask, seq_len, self.dimensions);
        Ok(l2_normalize(pooled))
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.run(text, EmbedMode::Passage)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.run(text, EmbedMode::Query)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn prefixed(text: &str, mode: EmbedMode) -> String {
    match mode {
        EmbedMode::Passage => format!("passage: {text}"),
        EmbedMode::Query => format!("query: {text}"),
    }
}

/// Average hidden states over positions whose attention mask is set.
fn mean_pooling(hidden: &[f32], mask: &[i64], seq_len: usize, hidden_size: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for (t, &m) in mask.iter().enumerate().take(seq_len) {
        if m == 0 {
            continue;
        }
        count += 1.0;
        let row = &hidden[t * hidden_size..(t + 1) * hidden_size];
        for (acc, v) in pooled.iter_mut().zip(row) {
            *acc += v;
        }
    }

    if count > 0.0 {
        pooled.iter_mut().for_each(|v| *v /= count);
    }
    pooled
}

fn l2_normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vec.iter_mut().for_each(|v| *v /= norm);
    }
    vec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(prefixed("nav bar", EmbedMode::Query), "query: nav bar");
        assert_eq!(prefixed("fn main", EmbedMode::Passage), "passage: fn main");
    }

    #[test]
    fn test_l2_normalize() {
        let normed = l2_normalize(vec![3.0, 4.0]);
        assert!((normed[0] - 0.6).abs() < 1e-6);
        assert!((normed[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_mean_pooling_skips_padding() {
        let hidden = vec![1.0, 2.0, 10.0, 20.0];
        let result = mean_pooling(&hidden, &[1, 0], 2, 2);
        assert_eq!(result, vec![1.0, 2.0]);
    }

    #[test]
    fn test_missing_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxEmbedder::new(dir.path(), 384).err().unwrap();
        assert!(matches!(err, EmbedderError::ModelLoadFailed(_)));
    }

    /// Requires downloaded model files.
    #[test]
    #[ignore]
    fn test_onnx_query_and_passage_differ() {
        let model_dir = Path::new("models/multilingual-e5-small");
        if !model_dir.join("model.onnx").exists() {
            return;
        }
        let embedder = OnnxEmbedder::new(model_dir, 384).unwrap();
        let q = embedder.embed_query("site header").unwrap();
        let p = embedder.embed("site header").unwrap();
        assert_eq!(q.len(), 384);
        assert_ne!(q, p);
    }
}
