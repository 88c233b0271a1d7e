//! Filesystem abstraction used by `repocache`.
//!
//! The cache never touches [`std::fs`] directly: every disk operation goes
//! through a [`Filesystem`] implementation so tests can swap in fixtures
//! and so the on-disk layout stays centralized in one place. [`LocalFilesystem`]
//! is the only implementation shipped here, backed by real files.

mod error;
mod local;
mod removal;

use std::ffi::OsString;
use std::fs::Metadata;
use std::path::Path;

pub use error::FsError;
pub use local::LocalFilesystem;
pub use removal::Removal;

/// A single entry returned by [`Filesystem::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub is_dir: bool,
}

/// A filesystem rooted at some directory, scoped so that callers can only
/// ever address paths inside that root.
///
/// Every path argument is relative to the provider's own root; `..` and
/// absolute paths are rejected with [`FsError::PathEscape`]. This is what
/// lets the bare store and checkout store each receive a provider scoped to
/// their own subtree without being able to reach outside it.
pub trait Filesystem: std::fmt::Debug + Send + Sync {
    /// The absolute path this provider is rooted at.
    fn root(&self) -> &Path;

    /// Returns metadata for `rel`, following symlinks.
    fn stat(&self, rel: &Path) -> Result<Metadata, FsError>;

    /// Reports whether `rel` exists, without erroring if it doesn't.
    fn exists(&self, rel: &Path) -> Result<bool, FsError>;

    /// Creates `rel` and any missing parent directories.
    fn create_dir_all(&self, rel: &Path) -> Result<(), FsError>;

    /// Creates (or truncates) the file at `rel`, creating parent
    /// directories as needed.
    fn create_file(&self, rel: &Path) -> Result<fs_err::File, FsError>;

    /// Reads the whole contents of `rel` as a UTF-8 string.
    fn read_to_string(&self, rel: &Path) -> Result<String, FsError>;

    /// Removes the single file at `rel`.
    fn remove_file(&self, rel: &Path) -> Result<(), FsError>;

    /// Removes `rel` and everything beneath it. Missing paths are not an
    /// error.
    fn remove_dir_all(&self, rel: &Path) -> Result<Removal, FsError>;

    /// Lists the immediate children of `rel`.
    fn read_dir(&self, rel: &Path) -> Result<Vec<DirEntry>, FsError>;

    /// Atomically moves `from` to `to`, creating `to`'s parent directories
    /// first. Used for the index's write-to-temp-then-rename persistence
    /// and for materializing a checkout into its final location only once
    /// it is fully populated.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError>;

    /// Recursively sums the size in bytes of every file under `rel`.
    fn dir_size(&self, rel: &Path) -> Result<u64, FsError>;

    /// Returns a new provider rooted at `rel`, scoped so it cannot address
    /// anything outside that subtree.
    fn scoped(&self, rel: &Path) -> Result<Box<dyn Filesystem>, FsError>;
}
