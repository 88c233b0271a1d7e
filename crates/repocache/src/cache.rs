use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use repocache_fs::Filesystem;
use repocache_git::RepositoryDriver;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::CacheError;
use crate::index::Index;
use crate::key::NormalizedUrl;

pub(crate) const BARE_DIR: &str = "bare";
pub(crate) const CHECKOUT_DIR: &str = "checkouts";
pub(crate) const INDEX_FILE: &str = "index.json";

/// In-memory record of an open bare repository: just its on-disk path.
///
/// The driver is stateless and path-addressed (every `RepositoryDriver`
/// call re-opens the repository it needs), so there is no live handle to
/// hold here beyond the location the bare store has already materialized.
#[derive(Debug, Clone)]
pub(crate) struct BareEntry {
    pub(crate) path: PathBuf,
}

/// In-memory record of an open checkout: its on-disk path.
#[derive(Debug, Clone)]
pub(crate) struct CheckoutEntry {
    pub(crate) path: PathBuf,
}

/// Everything guarded by [`Cache`]'s single read/write lock: the bare and
/// checkout handle maps, and the metadata index. One lock for all three,
/// per the concurrency model this cache implements — correctness needs
/// only single-flight materialization per key and index writes ordered
/// with their triggering mutation; a single coarse lock is the simplest
/// implementation that satisfies both.
#[derive(Debug, Default)]
pub(crate) struct CacheState {
    pub(crate) bares: HashMap<NormalizedUrl, BareEntry>,
    pub(crate) checkouts: HashMap<String, CheckoutEntry>,
    pub(crate) index: Index,
}

/// A two-tier repository cache: a bare object store per normalized URL
/// (tier 1) and working-tree checkouts per `(url, ref, cacheKey)` (tier 2)
/// that share storage with their bare via git alternates.
#[derive(Debug)]
pub struct Cache {
    pub(crate) base_path: PathBuf,
    pub(crate) bare_root: PathBuf,
    pub(crate) checkout_root: PathBuf,
    pub(crate) index_path: PathBuf,
    pub(crate) fs: Arc<dyn Filesystem>,
    pub(crate) driver: Arc<dyn RepositoryDriver>,
    pub(crate) state: RwLock<CacheState>,
}

impl Cache {
    /// Opens (or initializes) a cache rooted at `base_path`: ensures
    /// `bare/` and `checkouts/` exist and loads `index.json`, creating an
    /// empty one if absent.
    ///
    /// `fs` must be a [`Filesystem`] rooted at `base_path` itself (e.g.
    /// `LocalFilesystem::new(base_path.clone())`); the cache addresses it
    /// with paths relative to that root while using `base_path`-absolute
    /// paths for the repository driver, which talks to real disk paths
    /// directly.
    #[instrument(skip(fs, driver))]
    pub async fn new(
        base_path: impl Into<PathBuf>,
        fs: Arc<dyn Filesystem>,
        driver: Arc<dyn RepositoryDriver>,
    ) -> Result<Self, CacheError> {
        let base_path = base_path.into();
        let bare_root = base_path.join(BARE_DIR);
        let checkout_root = base_path.join(CHECKOUT_DIR);
        let index_path = base_path.join(INDEX_FILE);

        fs.create_dir_all(Path::new(BARE_DIR))?;
        fs.create_dir_all(Path::new(CHECKOUT_DIR))?;

        let index = Index::load_or_create(fs.as_ref(), Path::new(INDEX_FILE))?;

        Ok(Self {
            base_path,
            bare_root,
            checkout_root,
            index_path,
            fs,
            driver,
            state: RwLock::new(CacheState {
                bares: HashMap::new(),
                checkouts: HashMap::new(),
                index,
            }),
        })
    }

    /// Opens (or initializes) a cache rooted at `base_path` on the real
    /// filesystem, using [`repocache_fs::LocalFilesystem`] and
    /// [`repocache_git::Git2Driver`]. The ergonomic entry point for
    /// callers who don't need to substitute either; use [`Cache::new`]
    /// directly to inject a different [`Filesystem`] or [`RepositoryDriver`]
    /// (for tests, or a non-local backing store).
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let base_path = base_path.into();
        let fs: Arc<dyn Filesystem> = Arc::new(repocache_fs::LocalFilesystem::new(base_path.clone()));
        let driver: Arc<dyn RepositoryDriver> = Arc::new(repocache_git::Git2Driver::new());
        Self::new(base_path, fs, driver).await
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Maps a `base_path`-absolute path to the path relative to it that
    /// the cache's [`Filesystem`] provider expects.
    pub(crate) fn rel(&self, absolute: &Path) -> PathBuf {
        absolute
            .strip_prefix(&self.base_path)
            .unwrap_or(absolute)
            .to_path_buf()
    }

    /// Looks up the working-tree path for an already-materialized
    /// checkout, for callers that only want to check existence without
    /// triggering `getCheckout`'s clone-or-refresh side effects.
    ///
    /// Consults the in-process handle map first; if this process hasn't
    /// touched the key yet (e.g. right after a restart), falls back to
    /// the on-disk index and filesystem so a checkout a prior process
    /// already materialized is still found.
    pub async fn path_for(&self, url: &str, r#ref: &str, cache_key: &str) -> Option<PathBuf> {
        let normalized = crate::key::normalize(url);
        let key = crate::key::CompositeKey::new(normalized, r#ref, cache_key);

        let state = self.state.read().await;
        if let Some(entry) = state.checkouts.get(&key.to_string()) {
            return Some(entry.path.clone());
        }

        if state.index.get(&key).is_none() {
            return None;
        }
        let checkout_path = self.checkout_path(&key);
        match self.fs.exists(&self.rel(&checkout_path)) {
            Ok(true) => Some(checkout_path),
            Ok(false) | Err(_) => None,
        }
    }

    /// Runs a synchronous, potentially slow closure (a driver or
    /// filesystem call) on a blocking thread, surfacing a panicked or
    /// cancelled task as [`CacheError::Cancelled`].
    pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, CacheError> + Send + 'static,
    {
        match tokio::task::spawn_blocking(f).await {
            Ok(result) => result,
            Err(_join_error) => Err(CacheError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::options::GetOptions;

    #[tokio::test]
    async fn path_for_finds_an_in_process_checkout() {
        let (cache, tmp) = crate::testing::temp_cache().await;
        let (origin_path, _sha) = crate::testing::init_origin(tmp.path(), "README.md", "hello");
        let url = origin_path.to_string_lossy().to_string();

        let checkout_path = cache
            .get_checkout(&url, "ck", GetOptions::new().with_ref("master"))
            .await
            .unwrap();

        let found = cache.path_for(&url, "master", "ck").await;
        assert_eq!(found, Some(checkout_path));
    }

    #[tokio::test]
    async fn path_for_falls_back_to_the_index_after_a_restart() {
        let (cache, tmp) = crate::testing::temp_cache().await;
        let (origin_path, _sha) = crate::testing::init_origin(tmp.path(), "README.md", "hello");
        let url = origin_path.to_string_lossy().to_string();

        let checkout_path = cache
            .get_checkout(&url, "ck", GetOptions::new().with_ref("master"))
            .await
            .unwrap();

        {
            let mut state = cache.state.write().await;
            state.checkouts.clear();
        }

        let found = cache.path_for(&url, "master", "ck").await;
        assert_eq!(found, Some(checkout_path));
    }

    #[tokio::test]
    async fn path_for_returns_none_when_nothing_was_ever_materialized() {
        let (cache, _tmp) = crate::testing::temp_cache().await;
        let found = cache.path_for("https://example.com/a/b.git", "master", "ck").await;
        assert_eq!(found, None);
    }
}
