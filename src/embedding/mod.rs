//! Embedding provider abstraction.
//!
//! At most one provider is active per process, chosen once: the native ONNX
//! backend first, the portable pure-Rust backend second, none otherwise.
//! Hybrid search stays opt-in with zero runtime penalty when neither backend
//! is compiled in or constructible.
//!
//! All provider methods are synchronous and may be CPU-heavy (seconds on a
//! cold start); async callers use `tokio::task::spawn_blocking`.

pub mod cache;
#[cfg(feature = "native-embeddings")]
pub mod native;
#[cfg(feature = "portable-embeddings")]
pub mod portable;

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;

use crate::error::MemorixError;
use cache::EmbeddingCache;

/// Provider-native batch size for `embed_batch` chunking.
pub const EMBED_BATCH_SIZE: usize = 64;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of exactly `dimensions()`
/// entries.
pub trait EmbeddingProvider: Send + Sync {
    /// Short human-readable backend name for logs.
    fn name(&self) -> &'static str;

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Embed a single text string.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Select a provider: native → portable → none.
///
/// The decision is made once at startup and cached for the life of the
/// process by the caller (the engine holds the result).
pub fn create_provider(model_cache_dir: &Path) -> Option<Box<dyn EmbeddingProvider>> {
    #[cfg(feature = "native-embeddings")]
    {
        match native::NativeProvider::new(model_cache_dir) {
            Ok(provider) => {
                tracing::info!(provider = provider.name(), "embedding provider ready");
                return Some(Box::new(provider));
            }
            Err(e) => {
                tracing::warn!(error = %e, "native embedding backend unavailable");
            }
        }
    }
    #[cfg(not(feature = "native-embeddings"))]
    let _ = model_cache_dir;

    #[cfg(feature = "portable-embeddings")]
    {
        let provider = portable::PortableProvider::new();
        tracing::info!(provider = provider.name(), "embedding provider ready");
        return Some(Box::new(provider));
    }

    #[cfg(not(feature = "portable-embeddings"))]
    {
        tracing::info!("no embedding backend active; search is lexical-only");
        None
    }
}

/// A provider behind the two-layer cache.
///
/// Every embed checks the in-memory map first, then relies on the disk layer
/// having been folded into it at load; only the uncached subset reaches the
/// backend, in chunks of [`EMBED_BATCH_SIZE`], and results come back in the
/// original input order.
pub struct CachedProvider {
    inner: Box<dyn EmbeddingProvider>,
    cache: Mutex<EmbeddingCache>,
}

impl CachedProvider {
    pub fn new(inner: Box<dyn EmbeddingProvider>, cache: EmbeddingCache) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = cache::text_hash(text);
        {
            let mut cache = self.cache.lock().expect("cache lock");
            if let Some(vector) = cache.get(&key) {
                return Ok(vector);
            }
        }

        let vector = self.inner.embed(text)?;
        self.check_dimensions(&vector)?;

        let mut cache = self.cache.lock().expect("cache lock");
        cache.put(key, vector.clone());
        cache.flush()?;
        Ok(vector)
    }

    /// Embed a batch, computing only the uncached subset.
    ///
    /// A zero-length input returns an empty sequence without touching the
    /// backend.
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let keys: Vec<String> = texts.iter().map(|t| cache::text_hash(t)).collect();
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        {
            let mut cache = self.cache.lock().expect("cache lock");
            for (i, key) in keys.iter().enumerate() {
                match cache.get(key) {
                    Some(vector) => results[i] = Some(vector),
                    None => misses.push(i),
                }
            }
        }

        for chunk in misses.chunks(EMBED_BATCH_SIZE) {
            let chunk_texts: Vec<&str> = chunk.iter().map(|&i| texts[i]).collect();
            let vectors = self.inner.embed_batch(&chunk_texts)?;
            anyhow::ensure!(
                vectors.len() == chunk_texts.len(),
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                chunk_texts.len()
            );
            let mut cache = self.cache.lock().expect("cache lock");
            for (&i, vector) in chunk.iter().zip(vectors) {
                self.check_dimensions(&vector)?;
                cache.put(keys[i].clone(), vector.clone());
                results[i] = Some(vector);
            }
        }

        if !misses.is_empty() {
            self.cache.lock().expect("cache lock").flush()?;
        }

        Ok(results
            .into_iter()
            .map(|v| v.expect("every slot filled"))
            .collect())
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        let expected = self.inner.dimensions();
        if vector.len() != expected {
            return Err(MemorixError::DimensionMismatch {
                expected,
                got: vector.len(),
            }
            .into());
        }
        Ok(())
    }
}

/// Cosine similarity of two same-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
