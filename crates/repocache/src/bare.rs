//! Tier-1 storage: one bare object store per normalized URL.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::cache::{BareEntry, Cache};
use crate::error::CacheError;
use crate::key::NormalizedUrl;
use crate::options::GetOptions;

const REMOTE_NAME: &str = "origin";
const DEFAULT_BRANCH: &str = "master";

impl Cache {
    pub(crate) fn bare_path(&self, url: &NormalizedUrl) -> PathBuf {
        self.bare_root.join(format!("{url}.git"))
    }

    /// `getOrCreateBare`: double-checked-locking single-flight open or
    /// clone of the bare repository for `url`.
    #[instrument(skip(self, opts), fields(url = %url))]
    pub(crate) async fn ensure_bare(
        &self,
        url: &NormalizedUrl,
        raw_url: &str,
        opts: &GetOptions,
    ) -> Result<PathBuf, CacheError> {
        {
            let state = self.state.read().await;
            if let Some(entry) = state.bares.get(url) {
                return Ok(entry.path.clone());
            }
        }

        let mut state = self.state.write().await;
        if let Some(entry) = state.bares.get(url) {
            return Ok(entry.path.clone());
        }

        let bare_path = self.bare_path(url);
        if self.fs.exists(&self.rel(&bare_path))? {
            if !self.driver.is_valid_bare(&bare_path) {
                return Err(CacheError::Configuration(format!(
                    "`{}` exists but is not a valid bare repository",
                    bare_path.display()
                )));
            }
            debug!(path = %bare_path.display(), "reusing existing bare repository");
        } else {
            self.clone_bare(&bare_path, raw_url, opts).await?;
        }

        state.bares.insert(
            url.clone(),
            BareEntry {
                path: bare_path.clone(),
            },
        );
        Ok(bare_path)
    }

    /// `updateBare`: re-fetches and re-runs reference reconciliation
    /// without recreating the repository.
    #[instrument(skip(self, opts), fields(path = %bare_path.display()))]
    pub(crate) async fn update_bare(&self, bare_path: &std::path::Path, opts: &GetOptions) -> Result<(), CacheError> {
        self.fetch_and_reconcile(bare_path, opts).await
    }

    /// Initializes a bare repository, points `origin` at `raw_url`,
    /// fetches, and reconciles references.
    async fn clone_bare(&self, bare_path: &std::path::Path, raw_url: &str, opts: &GetOptions) -> Result<(), CacheError> {
        let driver = Arc::clone(&self.driver);
        let bare_path_owned = bare_path.to_path_buf();
        Self::run_blocking(move || driver.init_bare(&bare_path_owned).map_err(CacheError::from)).await?;

        self.driver_set_remote(bare_path, REMOTE_NAME, raw_url).await?;
        self.fetch_and_reconcile(bare_path, opts).await
    }

    async fn driver_set_remote(&self, bare_path: &std::path::Path, remote: &str, url: &str) -> Result<(), CacheError> {
        let driver = Arc::clone(&self.driver);
        let path = bare_path.to_path_buf();
        let remote = remote.to_string();
        let url = url.to_string();
        Self::run_blocking(move || driver.set_remote_url(&path, &remote, &url).map_err(CacheError::from)).await
    }

    async fn fetch_and_reconcile(&self, bare_path: &std::path::Path, opts: &GetOptions) -> Result<(), CacheError> {
        let driver = Arc::clone(&self.driver);
        let path = bare_path.to_path_buf();
        let depth = opts.depth_or_full();
        let auth = opts.auth.clone();
        Self::run_blocking(move || {
            driver
                .fetch(&path, REMOTE_NAME, &[], depth, auth.as_ref())
                .map_err(CacheError::from)
        })
        .await?;

        self.reconcile_references(bare_path).await
    }

    /// Promotes every `refs/remotes/origin/<name>` to a local
    /// `refs/heads/<name>` with the same hash. `master` must be
    /// reconciled when present, so a failure updating it propagates;
    /// every other branch is reconciled best-effort. If a local `master`
    /// now exists, `HEAD` is set to it; failure to do so is non-fatal.
    async fn reconcile_references(&self, bare_path: &std::path::Path) -> Result<(), CacheError> {
        let driver = Arc::clone(&self.driver);
        let path = bare_path.to_path_buf();
        let branches = Self::run_blocking(move || {
            driver
                .list_remote_branches(&path, REMOTE_NAME)
                .map_err(CacheError::from)
        })
        .await?;

        for (name, sha) in branches {
            let driver = Arc::clone(&self.driver);
            let path = bare_path.to_path_buf();
            let is_master = name == DEFAULT_BRANCH;
            let branch_name = name.clone();
            let result = Self::run_blocking(move || {
                driver.set_local_branch(&path, &name, &sha).map_err(CacheError::from)
            })
            .await;
            if let Err(err) = result {
                if is_master {
                    return Err(err);
                }
                warn!(branch = %branch_name, error = %err, "failed to reconcile remote-tracking branch");
            }
        }

        let driver = Arc::clone(&self.driver);
        let path = bare_path.to_path_buf();
        let has_master = Self::run_blocking(move || {
            driver
                .local_branch_exists(&path, DEFAULT_BRANCH)
                .map_err(CacheError::from)
        })
        .await?;

        if has_master {
            let driver = Arc::clone(&self.driver);
            let path = bare_path.to_path_buf();
            if let Err(err) = Self::run_blocking(move || {
                driver
                    .set_head_to_branch(&path, DEFAULT_BRANCH)
                    .map_err(CacheError::from)
            })
            .await
            {
                warn!(error = %err, "failed to set HEAD to local master; leaving HEAD unchanged");
            }
        }

        Ok(())
    }

    /// Resolves the ref to check out when the caller did not supply one:
    /// the bare's current `HEAD` short name.
    pub(crate) async fn default_ref(&self, bare_path: &std::path::Path) -> Result<String, CacheError> {
        let driver = Arc::clone(&self.driver);
        let path = bare_path.to_path_buf();
        Self::run_blocking(move || driver.head_ref_name(&path).map_err(CacheError::from)).await
    }
}
