//! Error taxonomy surfaced through MCP tool results.
//!
//! Every failure a client can observe carries one of these kinds. Filesystem
//! errors are wrapped with the operation and path but never translated;
//! background access-accounting errors are swallowed before they reach here.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MemorixError {
    /// Project detection returned the `__invalid__` sentinel. The server
    /// refuses to initialize against a home or system directory.
    #[error("refusing to serve from an invalid project directory: {0}")]
    InvalidProject(String),

    /// Lock acquisition exceeded the retry budget and the force-retake failed.
    #[error("timed out acquiring lock at {}", path.display())]
    LockTimeout { path: PathBuf },

    /// A durable file exists but failed to parse. Missing files are treated
    /// as empty; a syntactically invalid file is fatal for that file and is
    /// never auto-repaired.
    #[error("corrupt data file {}: {source}", path.display())]
    Integrity {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Vector search was explicitly requested but no embedding backend is
    /// active. Ordinary hybrid search degrades silently instead.
    #[error("no embedding provider is active")]
    EmbeddingUnavailable,

    /// Provider produced a vector whose length disagrees with its declared
    /// dimensionality. Fatal for the provider; search degrades to lexical.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MemorixError {
    /// Stable machine-readable tag included in tool error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidProject(_) => "InvalidProject",
            Self::LockTimeout { .. } => "LockTimeout",
            Self::Integrity { .. } => "IntegrityError",
            Self::NotFound(_) => "NotFound",
            Self::Conflict(_) => "Conflict",
            Self::EmbeddingUnavailable => "EmbeddingUnavailable",
            Self::DimensionMismatch { .. } => "DimensionMismatch",
            Self::Io { .. } => "IoError",
        }
    }

    /// Wrap an IO error with the failing operation and path.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = MemorixError> = std::result::Result<T, E>;
