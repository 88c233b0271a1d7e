use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by a [`crate::Filesystem`] implementation.
///
/// Every variant carries the path the operation was attempted against, so
/// callers several layers up (the bare store, the checkout store, the
/// pruner) can report useful diagnostics without re-deriving context.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("failed to stat `{path}`")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create directory `{path}`")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create file `{path}`")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove `{path}`")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read directory `{path}`")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename `{from}` to `{to}`")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk `{path}`")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("scoped path `{path}` escapes its parent filesystem root")]
    PathEscape { path: PathBuf },
}
