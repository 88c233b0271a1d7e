//! Shared fixtures for this crate's unit tests.

use std::sync::Arc;

use repocache_fs::LocalFilesystem;
use repocache_git::Git2Driver;

use crate::cache::Cache;

/// A `Cache` rooted at a fresh temp directory, with a real `git2`-backed
/// driver. The returned `TempDir` must be kept alive for the cache's
/// on-disk state to remain valid.
pub(crate) async fn temp_cache() -> (Cache, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let fs: Arc<dyn repocache_fs::Filesystem> = Arc::new(LocalFilesystem::new(tmp.path()));
    let driver: Arc<dyn repocache_git::RepositoryDriver> = Arc::new(Git2Driver::new());
    let cache = Cache::new(tmp.path(), fs, driver).await.unwrap();
    (cache, tmp)
}

/// Creates a non-bare origin repository at `dir/origin` with a single
/// commit of `name` containing `contents` on the default branch, returning
/// its path and the commit's SHA.
pub(crate) fn init_origin(dir: &std::path::Path, name: &str, contents: &str) -> (std::path::PathBuf, String) {
    let origin_path = dir.join("origin");
    let origin = git2::Repository::init(&origin_path).unwrap();
    std::fs::write(origin_path.join(name), contents).unwrap();
    let mut index = origin.index().unwrap();
    index.add_path(std::path::Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = origin.find_tree(tree_id).unwrap();
    let sig = git2::Signature::now("test", "test@example.com").unwrap();
    let oid = origin
        .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();
    (origin_path, oid.to_string())
}
