use std::collections::HashMap;
use std::path::Path;

use repocache_fs::Filesystem;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::key::{normalize, CompositeKey};
use crate::metadata::CheckoutMetadata;

const INDEX_VERSION: &str = "1";

/// The on-disk metadata index: a versioned document mapping composite-key
/// strings to [`CheckoutMetadata`].
///
/// Holds no lock of its own — callers (the [`crate::cache::Cache`] facade)
/// serialize access to it through their own single cache-wide lock, per
/// the concurrency model in §5 of the design this implements.
#[derive(Debug, Clone, Default)]
pub struct Index {
    checkouts: HashMap<String, CheckoutMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexDocument {
    version: String,
    checkouts: HashMap<String, CheckoutMetadata>,
}

impl Index {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            checkouts: HashMap::new(),
        }
    }

    /// Loads the index at `path` through `fs`, or returns an empty index if
    /// no file exists there yet. A present-but-unparseable file, or one
    /// whose version does not match, is a hard failure: indexes are never
    /// silently migrated.
    pub fn load_or_create(fs: &dyn Filesystem, path: &Path) -> Result<Self, CacheError> {
        if !fs.exists(path)? {
            return Ok(Self::empty());
        }
        let raw = fs.read_to_string(path)?;
        let doc: IndexDocument = serde_json::from_str(&raw).map_err(|source| CacheError::InvalidIndex {
            path: path.to_path_buf(),
            source,
        })?;
        if doc.version != INDEX_VERSION {
            return Err(CacheError::IndexVersionMismatch {
                path: path.to_path_buf(),
                found: doc.version,
                expected: INDEX_VERSION.to_string(),
            });
        }
        Ok(Self {
            checkouts: doc.checkouts,
        })
    }

    /// Serializes the whole index to `path.tmp`, then renames it over
    /// `path`. Callers observing `path` either see the previous committed
    /// content or this write in full, never a partial document.
    pub fn save(&self, fs: &dyn Filesystem, path: &Path) -> Result<(), CacheError> {
        let doc = IndexDocument {
            version: INDEX_VERSION.to_string(),
            checkouts: self.checkouts.clone(),
        };
        let tmp_path = tmp_path_for(path);
        let write_result = (|| -> Result<(), CacheError> {
            let mut file = fs.create_file(&tmp_path)?;
            serde_json::to_writer_pretty(&mut file, &doc).map_err(CacheError::Serialize)?;
            Ok(())
        })();
        if let Err(err) = write_result {
            let _ = fs.remove_file(&tmp_path);
            return Err(err);
        }
        fs.rename(&tmp_path, path)?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &CompositeKey) -> Option<&CheckoutMetadata> {
        self.checkouts.get(&key.to_string())
    }

    pub fn set(&mut self, key: &CompositeKey, metadata: CheckoutMetadata) {
        self.checkouts.insert(key.to_string(), metadata);
    }

    pub fn delete(&mut self, key: &CompositeKey) {
        self.checkouts.remove(&key.to_string());
    }

    /// Removes an entry by its raw composite-key string, as returned by
    /// [`Index::list`] or [`Index::filter_by_url`]. A no-op if absent.
    pub fn delete_by_str(&mut self, key: &str) {
        self.checkouts.remove(key);
    }

    /// Touches the entry for `key`, if present, updating `lastAccess` (and
    /// `expiresAt`, if `ttl` is set). A no-op if no entry exists.
    pub fn update_last_access(&mut self, key: &CompositeKey) -> Result<(), CacheError> {
        if let Some(metadata) = self.checkouts.get_mut(&key.to_string()) {
            metadata.touch()?;
        }
        Ok(())
    }

    /// A snapshot copy of every `(compositeKey, metadata)` pair, safe to
    /// iterate without holding any lock.
    #[must_use]
    pub fn list(&self) -> Vec<(String, CheckoutMetadata)> {
        self.checkouts
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The subset of entries whose metadata URL normalizes to the same
    /// value as `url`.
    #[must_use]
    pub fn filter_by_url(&self, url: &str) -> Vec<(String, CheckoutMetadata)> {
        let target = normalize(url);
        self.checkouts
            .iter()
            .filter(|(_, meta)| normalize(&meta.url) == target)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checkouts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkouts.is_empty()
    }
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    std::path::PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use repocache_fs::LocalFilesystem;

    use super::*;

    fn key(url: &str, r#ref: &str, cache_key: &str) -> CompositeKey {
        CompositeKey::new(normalize(url), r#ref, cache_key)
    }

    #[test]
    fn load_or_create_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new(dir.path());
        let index = Index::load_or_create(&fs, Path::new("index.json")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new(dir.path());
        let mut index = Index::empty();
        let k = key("https://example.com/a/b.git", "main", "ck");
        let meta = CheckoutMetadata::new("https://example.com/a/b.git", "main", "ck", None).unwrap();
        index.set(&k, meta.clone());
        index.save(&fs, Path::new("index.json")).unwrap();

        let reloaded = Index::load_or_create(&fs, Path::new("index.json")).unwrap();
        assert_eq!(reloaded.get(&k), Some(&meta));
        assert!(!fs.exists(Path::new("index.json.tmp")).unwrap());
    }

    #[test]
    fn version_mismatch_is_a_hard_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new(dir.path());
        let mut file = fs.create_file(Path::new("index.json")).unwrap();
        use std::io::Write;
        write!(file, r#"{{"version":"2","checkouts":{{}}}}"#).unwrap();
        drop(file);

        let err = Index::load_or_create(&fs, Path::new("index.json")).unwrap_err();
        assert!(matches!(err, CacheError::IndexVersionMismatch { .. }));
    }

    #[test]
    fn filter_by_url_matches_normalized_equivalents() {
        let mut index = Index::empty();
        let k1 = key("https://example.com/a/b.git", "main", "ck1");
        let meta1 = CheckoutMetadata::new("https://example.com/a/b.git", "main", "ck1", None).unwrap();
        index.set(&k1, meta1);
        let k2 = key("git@example.com:a/b.git", "dev", "ck2");
        let meta2 = CheckoutMetadata::new("git@example.com:a/b.git", "dev", "ck2", None).unwrap();
        index.set(&k2, meta2);

        let matches = index.filter_by_url("https://example.com/a/b");
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn delete_is_a_noop_when_absent() {
        let mut index = Index::empty();
        let k = key("https://example.com/a/b.git", "main", "ck");
        index.delete(&k);
        assert!(index.is_empty());
    }
}
