//! Two-layer embedding cache.
//!
//! Layer 1 is an in-memory map capped at 5,000 entries with FIFO eviction.
//! Layer 2 is `.embedding-cache.json`, loaded once at provider start and
//! rewritten after dirty batch operations. Surviving restarts is the point:
//! re-embedding a few thousand observations costs minutes of CPU on a cold
//! start.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{MemorixError, Result};
use crate::fsio;

/// In-memory capacity; the disk snapshot inherits the same bound.
pub const CACHE_CAPACITY: usize = 5_000;

/// Cache key: first 16 hex chars of SHA-256(text).
pub fn text_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

pub struct EmbeddingCache {
    map: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
    path: PathBuf,
    dirty: bool,
}

impl EmbeddingCache {
    /// An empty cache that will flush to `path`.
    pub fn empty(path: &Path) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            path: path.to_path_buf(),
            dirty: false,
        }
    }

    /// Load the disk layer. Entries whose vector length disagrees with the
    /// active provider's dimensionality are discarded. A missing file is an
    /// empty cache; an unparseable file is an integrity error.
    pub fn load(path: &Path, dimensions: usize) -> Result<Self> {
        let mut cache = Self::empty(path);

        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(cache),
            Err(e) => return Err(MemorixError::io("read", path, e)),
        };

        let entries: Vec<(String, Vec<f32>)> =
            serde_json::from_str(&contents).map_err(|source| MemorixError::Integrity {
                path: path.to_path_buf(),
                source,
            })?;

        let mut dropped = 0usize;
        for (hash, vector) in entries {
            if vector.len() != dimensions {
                dropped += 1;
                continue;
            }
            cache.insert(hash, vector);
        }
        if dropped > 0 {
            tracing::warn!(dropped, "discarded embedding cache entries with stale dimensions");
            cache.dirty = true;
        }

        Ok(cache)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&mut self, hash: &str) -> Option<Vec<f32>> {
        self.map.get(hash).cloned()
    }

    pub fn put(&mut self, hash: String, vector: Vec<f32>) {
        if self.map.contains_key(&hash) {
            self.map.insert(hash, vector);
            self.dirty = true;
            return;
        }
        self.insert(hash, vector);
        self.dirty = true;
    }

    /// Write the disk layer if anything changed since the last flush.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let entries: Vec<(&String, &Vec<f32>)> = self
            .order
            .iter()
            .filter_map(|hash| self.map.get(hash).map(|v| (hash, v)))
            .collect();
        let json = serde_json::to_vec(&entries).expect("cache serializes");
        fsio::atomic_write(&self.path, &json)?;
        self.dirty = false;
        Ok(())
    }

    fn insert(&mut self, hash: String, vector: Vec<f32>) {
        while self.order.len() >= CACHE_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.map.remove(&evicted);
            }
        }
        self.order.push_back(hash.clone());
        self.map.insert(hash, vector);
    }
}
