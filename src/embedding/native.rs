//! Native ONNX Runtime embedding backend.
//!
//! Runs all-MiniLM-L6-v2 via `ort`. Model files live in the configured cache
//! directory; run `memorix model download` to fetch them.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::EmbeddingProvider;

/// all-MiniLM-L6-v2 output dimensionality.
pub const NATIVE_DIMENSIONS: usize = 384;

/// Maximum sequence length the model was trained at.
const MAX_SEQ_LEN: usize = 256;

pub struct NativeProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// The tokenizer is Send+Sync on its own; the session only runs behind the
// Mutex, which gives run() exclusive access.
unsafe impl Send for NativeProvider {}
unsafe impl Sync for NativeProvider {}

impl NativeProvider {
    pub fn new(model_cache_dir: &Path) -> Result<Self> {
        let model_path = model_cache_dir.join("model.onnx");
        let tokenizer_path = model_cache_dir.join("tokenizer.json");

        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}. Run `memorix model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer not found at {}. Run `memorix model download` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;

        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }
}

impl EmbeddingProvider for NativeProvider {
    fn name(&self) -> &'static str {
        "onnx/all-MiniLM-L6-v2"
    }

    fn dimensions(&self) -> usize {
        NATIVE_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text])?;
        Ok(results.into_iter().next().expect("batch had one input"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let batch = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let input_ids: Vec<i64> = encodings
            .iter()
            .flat_map(|e| e.get_ids().iter().map(|&id| id as i64))
            .collect();
        let attention_mask: Vec<i64> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().iter().map(|&m| m as i64))
            .collect();
        // Single-sentence input: segment ids stay zero.
        let segment_ids = vec![0i64; batch * seq_len];

        let shape = vec![batch as i64, seq_len as i64];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))?;
        let mask_tensor = Tensor::from_array((
            shape.clone(),
            attention_mask.clone().into_boxed_slice(),
        ))?;
        let segment_tensor = Tensor::from_array((shape, segment_ids.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => mask_tensor,
            "token_type_ids" => segment_tensor,
        })?;

        // Exports disagree on the output name; fall back to the first output.
        let hidden = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);
        let (out_shape, data) = hidden
            .try_extract_tensor::<f32>()
            .context("failed to extract token embeddings")?;

        let dims: &[i64] = &out_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == NATIVE_DIMENSIONS as i64,
            "unexpected token embedding shape {dims:?}, expected [batch, seq, {NATIVE_DIMENSIONS}]"
        );
        let out_seq = dims[1] as usize;

        Ok((0..batch)
            .map(|row| {
                pooled_embedding(
                    &data[row * out_seq * NATIVE_DIMENSIONS..(row + 1) * out_seq * NATIVE_DIMENSIONS],
                    &attention_mask[row * seq_len..(row + 1) * seq_len],
                )
            })
            .collect())
    }
}

/// Average one sequence's attended token vectors, then L2-normalize.
///
/// `token_vectors` is one row of the model output, `NATIVE_DIMENSIONS`
/// floats per token; `mask` marks which tokens are real input rather than
/// padding. All-padding input yields a zero vector.
fn pooled_embedding(token_vectors: &[f32], mask: &[i64]) -> Vec<f32> {
    let mut pooled = vec![0.0f32; NATIVE_DIMENSIONS];
    let mut attended = 0.0f32;

    for (vector, _) in token_vectors
        .chunks(NATIVE_DIMENSIONS)
        .zip(mask)
        .filter(|(_, &m)| m != 0)
    {
        attended += 1.0;
        for (acc, value) in pooled.iter_mut().zip(vector) {
            *acc += value;
        }
    }

    if attended > 0.0 {
        for value in &mut pooled {
            *value /= attended;
        }
    }

    let norm = pooled.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut pooled {
            *value /= norm;
        }
    }
    pooled
}
