//! Portable pure-Rust embedding backend.
//!
//! Hashed bag-of-words vectors: each token and token bigram is hashed into a
//! fixed number of buckets and the result is L2-normalized. No model files,
//! no native code. Quality is far below the ONNX backend but it gives vector
//! recall a signal on installs where ONNX Runtime cannot load.

use anyhow::Result;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

pub const PORTABLE_DIMENSIONS: usize = 256;

pub struct PortableProvider;

impl PortableProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PortableProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket(token: &str) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let n = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    n as usize % PORTABLE_DIMENSIONS
}

impl EmbeddingProvider for PortableProvider {
    fn name(&self) -> &'static str {
        "portable/hashed-bow"
    }

    fn dimensions(&self) -> usize {
        PORTABLE_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; PORTABLE_DIMENSIONS];

        let tokens: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
            .map(String::from)
            .collect();

        for token in &tokens {
            v[bucket(token)] += 1.0;
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            v[bucket(&bigram)] += 0.5;
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}
