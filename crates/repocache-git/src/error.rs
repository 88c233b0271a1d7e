use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by a [`crate::RepositoryDriver`] implementation.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to initialize bare repository at `{path}`")]
    Init {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("failed to open repository at `{path}`")]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("failed to configure remote `{remote}` for `{path}`")]
    Remote {
        path: PathBuf,
        remote: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to fetch `{refspec}` from `{remote}` into `{path}`")]
    Fetch {
        path: PathBuf,
        remote: String,
        refspec: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to resolve revision `{revision}` in `{path}`")]
    ResolveRevision {
        path: PathBuf,
        revision: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to clone `{source_path}` into `{target_path}` with shared objects")]
    Clone {
        source_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("failed to write alternates file for `{path}`")]
    Alternates {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to reset `{path}` to `{revision}`")]
    Reset {
        path: PathBuf,
        revision: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to read HEAD of `{path}`")]
    Head {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("revision `{revision}` not found in `{path}`")]
    RevisionNotFound { path: PathBuf, revision: String },
}
