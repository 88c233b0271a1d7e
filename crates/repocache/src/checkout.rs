//! Tier-2 storage: one working-tree checkout per composite key, sharing
//! object storage with its bare via git alternates.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::cache::{Cache, CheckoutEntry};
use crate::error::CacheError;
use crate::key::CompositeKey;
use crate::options::GetOptions;

impl Cache {
    pub(crate) fn checkout_path(&self, key: &CompositeKey) -> PathBuf {
        self.checkout_root.join(key.relative_path())
    }

    /// `getOrCreateCheckout`: double-checked-locking single-flight open,
    /// create, or refresh of the working tree for `key`.
    #[instrument(skip(self, opts), fields(key = %key))]
    pub(crate) async fn ensure_checkout(
        &self,
        key: &CompositeKey,
        bare_path: &std::path::Path,
        opts: &GetOptions,
    ) -> Result<PathBuf, CacheError> {
        let checkout_path = self.checkout_path(key);

        {
            let state = self.state.read().await;
            if state.checkouts.contains_key(&key.to_string()) {
                drop(state);
                if opts.update {
                    self.refresh_checkout(key, &checkout_path, bare_path).await?;
                }
                return Ok(checkout_path);
            }
        }

        let mut state = self.state.write().await;
        if state.checkouts.contains_key(&key.to_string()) {
            drop(state);
            if opts.update {
                self.refresh_checkout(key, &checkout_path, bare_path).await?;
            }
            return Ok(checkout_path);
        }

        if self.fs.exists(&self.rel(&checkout_path))? {
            debug!(path = %checkout_path.display(), "reusing existing checkout");
            if opts.update {
                drop(state);
                self.refresh_checkout(key, &checkout_path, bare_path).await?;
                state = self.state.write().await;
            }
        } else {
            self.create_checkout(key, &checkout_path, bare_path, opts).await?;
        }

        state.checkouts.insert(
            key.to_string(),
            CheckoutEntry {
                path: checkout_path.clone(),
            },
        );
        Ok(checkout_path)
    }

    /// Creates `checkoutPath` and clones into it with shared objects
    /// (alternates pointing at the bare), then checks out `ref`: first as
    /// a local branch, checked out non-detached so `HEAD` reads as the
    /// branch name, falling back to resolving it as a revision against the
    /// bare (authoritative) and checking out the resulting hash detached.
    async fn create_checkout(
        &self,
        key: &CompositeKey,
        checkout_path: &std::path::Path,
        bare_path: &std::path::Path,
        _opts: &GetOptions,
    ) -> Result<(), CacheError> {
        self.fs.create_dir_all(&self.rel(checkout_path))?;

        let (revision, is_local_branch) = self.resolve_checkout_revision(key, bare_path).await?;
        let branch = is_local_branch.then(|| key.r#ref.clone());

        let driver = Arc::clone(&self.driver);
        let bare = bare_path.to_path_buf();
        let target = checkout_path.to_path_buf();
        let rev = revision.clone();
        Self::run_blocking(move || {
            driver
                .clone_with_shared_objects(&bare, &target, &rev, branch.as_deref())
                .map_err(CacheError::from)
        })
        .await
    }

    /// Resolves `key.ref` to a commit hash against the bare repository,
    /// preferring it as a local branch name and falling back to a generic
    /// revision lookup. The returned `bool` is `true` when the ref resolved
    /// via `refs/heads/<ref>`.
    async fn resolve_checkout_revision(
        &self,
        key: &CompositeKey,
        bare_path: &std::path::Path,
    ) -> Result<(String, bool), CacheError> {
        let driver = Arc::clone(&self.driver);
        let path = bare_path.to_path_buf();
        let branch_ref = format!("refs/heads/{}", key.r#ref);
        let branch_result = Self::run_blocking({
            let driver = Arc::clone(&driver);
            let path = path.clone();
            move || driver.resolve_revision(&path, &branch_ref).map_err(CacheError::from)
        })
        .await;

        if let Ok(sha) = branch_result {
            return Ok((sha, true));
        }

        let revision = key.r#ref.clone();
        let key_owned = key.clone();
        Self::run_blocking(move || {
            driver
                .resolve_revision(&path, &revision)
                .map_err(|_| CacheError::RevisionNotFound {
                    key: key_owned,
                    revision,
                })
        })
        .await
        .map(|sha| (sha, false))
    }

    /// Re-opens the checkout (whose alternates already point at shared
    /// objects) and hard-resets it to the resolved revision.
    async fn refresh_checkout(
        &self,
        key: &CompositeKey,
        checkout_path: &std::path::Path,
        bare_path: &std::path::Path,
    ) -> Result<(), CacheError> {
        let (revision, _) = self.resolve_checkout_revision(key, bare_path).await?;
        let driver = Arc::clone(&self.driver);
        let path = checkout_path.to_path_buf();
        Self::run_blocking(move || driver.reset_hard(&path, &revision).map_err(CacheError::from)).await
    }
}
