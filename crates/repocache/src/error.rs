use thiserror::Error;

use crate::CompositeKey;

/// Errors surfaced by the cache's public API.
///
/// Every variant embeds enough context (operation, URL, composite key) to
/// diagnose a failure without chasing down the originating driver or
/// filesystem call.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache configuration: {0}")]
    Configuration(String),

    #[error("index at `{path}` is invalid")]
    InvalidIndex {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("index at `{path}` has version `{found}`, expected `{expected}`")]
    IndexVersionMismatch {
        path: std::path::PathBuf,
        found: String,
        expected: String,
    },

    #[error("filesystem operation failed")]
    Filesystem(#[from] repocache_fs::FsError),

    #[error("repository driver operation failed")]
    Driver(#[from] repocache_git::GitError),

    #[error("no checkout found for url `{url}` and cache key `{cache_key}`")]
    NotFound { url: String, cache_key: String },

    #[error("failed to resolve revision `{revision}` for `{key}`")]
    RevisionNotFound {
        key: CompositeKey,
        revision: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("clock arithmetic overflowed: {0}")]
    Clock(String),

    #[error("failed to serialize index")]
    Serialize(#[source] serde_json::Error),
}
