//! Repository driver abstraction used by `repocache`.
//!
//! The cache core never calls `git2` directly; every repository operation
//! goes through a [`RepositoryDriver`] so the bare store and checkout store
//! can be tested against a driver double and so the one real implementation,
//! [`Git2Driver`], stays the single place that knows about `git2`'s API.

mod auth;
mod driver;
mod error;

use std::path::Path;

pub use auth::GitAuth;
pub use driver::Git2Driver;
pub use error::GitError;

/// Minimum number of hex characters kept by [`short_sha`].
const SHORT_SHA_LEN: usize = 7;

/// Truncates a full 40-character SHA to the short form used in logs and
/// checkout directory names, mirroring `git rev-parse --short`.
#[must_use]
pub fn short_sha(sha: &str) -> &str {
    if sha.len() > SHORT_SHA_LEN {
        &sha[..SHORT_SHA_LEN]
    } else {
        sha
    }
}

/// Operations the cache needs from a git implementation.
///
/// All paths are absolute; the driver does not know about the cache's
/// on-disk layout conventions, only about plain git repositories living at
/// the paths it is given.
pub trait RepositoryDriver: std::fmt::Debug + Send + Sync {
    /// Creates a new bare repository at `path`, which must not already
    /// exist.
    fn init_bare(&self, path: &Path) -> Result<(), GitError>;

    /// Reports whether `path` already holds a usable bare repository.
    fn is_valid_bare(&self, path: &Path) -> bool;

    /// Points `remote` at `url`, creating the remote if it does not exist.
    fn set_remote_url(&self, path: &Path, remote: &str, url: &str) -> Result<(), GitError>;

    /// Fetches `refspecs` from `remote` into the repository at `path`.
    ///
    /// `depth` requests a shallow fetch when set; `auth` supplies
    /// credentials for authenticated remotes.
    fn fetch(
        &self,
        path: &Path,
        remote: &str,
        refspecs: &[String],
        depth: Option<u32>,
        auth: Option<&GitAuth>,
    ) -> Result<(), GitError>;

    /// Resolves `revision` (a branch, tag, or partial/full SHA) to a full
    /// 40-character commit SHA.
    fn resolve_revision(&self, path: &Path, revision: &str) -> Result<String, GitError>;

    /// Returns the full SHA that `HEAD` points at.
    fn head_sha(&self, path: &Path) -> Result<String, GitError>;

    /// Reports whether the repository at `path` is a shallow clone.
    fn is_shallow(&self, path: &Path) -> Result<bool, GitError>;

    /// Creates a working-tree checkout at `checkout_path` whose object
    /// database is an alternate of the bare repository at `bare_path`,
    /// then checks out `revision`.
    ///
    /// When `branch` is `Some(name)`, `revision` resolved from the local
    /// branch `refs/heads/<name>`: the checkout creates (or updates) that
    /// branch to point at `revision` and checks it out non-detached, so
    /// `HEAD` reads as `name` rather than a bare SHA. When `branch` is
    /// `None`, `revision` was resolved as a generic revision (tag, SHA, or
    /// anything else that isn't a local branch) and the checkout is left
    /// detached at `revision`.
    fn clone_with_shared_objects(
        &self,
        bare_path: &Path,
        checkout_path: &Path,
        revision: &str,
        branch: Option<&str>,
    ) -> Result<(), GitError>;

    /// Hard-resets the existing checkout at `checkout_path` to `revision`,
    /// discarding any local modifications.
    fn reset_hard(&self, checkout_path: &Path, revision: &str) -> Result<(), GitError>;

    /// Lists the remote-tracking branches `refs/remotes/<remote>/*` in the
    /// repository at `path` as `(branch name, commit SHA)` pairs. Used by
    /// the bare store's post-fetch reconciliation pass.
    fn list_remote_branches(&self, path: &Path, remote: &str) -> Result<Vec<(String, String)>, GitError>;

    /// Reports whether a local branch named `name` exists.
    fn local_branch_exists(&self, path: &Path, name: &str) -> Result<bool, GitError>;

    /// Creates or force-updates the local branch `refs/heads/<name>` to
    /// point at `sha`.
    fn set_local_branch(&self, path: &Path, name: &str, sha: &str) -> Result<(), GitError>;

    /// Sets `HEAD` as a symbolic reference to the local branch `name`.
    fn set_head_to_branch(&self, path: &Path, name: &str) -> Result<(), GitError>;

    /// The short name of the branch `HEAD` points at, or the short SHA if
    /// `HEAD` is detached.
    fn head_ref_name(&self, path: &Path) -> Result<String, GitError>;
}
