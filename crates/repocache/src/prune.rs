//! Pruning strategies and the `Prune` operation.

use std::time::Duration;

use jiff::Timestamp;
use tracing::{instrument, warn};

use crate::cache::Cache;
use crate::error::CacheError;
use crate::metadata::CheckoutMetadata;
use crate::time;

/// A predicate over checkout metadata selecting entries for removal.
/// Composable by OR: an entry is pruned if *any* strategy selects it.
pub trait PruneStrategy: Send + Sync {
    /// Whether `metadata` should be removed, evaluated against `now`.
    fn should_prune(&self, metadata: &CheckoutMetadata, now: Timestamp) -> bool;

    /// Strategies that instead need a whole-index pass (currently only
    /// [`ToSize`]) return their byte limit here and are excluded from the
    /// simple per-entry OR loop.
    fn size_limit(&self) -> Option<u64> {
        None
    }
}

/// Removes every checkout whose `expiresAt` has already passed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Expired;

impl PruneStrategy for Expired {
    fn should_prune(&self, metadata: &CheckoutMetadata, now: Timestamp) -> bool {
        metadata.expires_at.is_some_and(|expires_at| expires_at < now)
    }
}

/// Removes every ephemeral checkout not accessed within `d`. Persistent
/// checkouts (no `ttl`) are never candidates.
#[derive(Debug, Clone, Copy)]
pub struct OlderThan(pub Duration);

impl PruneStrategy for OlderThan {
    fn should_prune(&self, metadata: &CheckoutMetadata, now: Timestamp) -> bool {
        !metadata.is_persistent() && time::elapsed(now, metadata.last_access) > self.0
    }
}

/// Removes the least-recently-used ephemeral checkouts until total disk
/// usage across tracked checkouts is under `max_bytes`. Persistent
/// checkouts (no `ttl`) are never candidates. Special-cased in [`Prune`]:
/// its own `should_prune` always returns `false` so the simple OR-loop
/// over other strategies ignores it.
#[derive(Debug, Clone, Copy)]
pub struct ToSize(pub u64);

impl PruneStrategy for ToSize {
    fn should_prune(&self, _metadata: &CheckoutMetadata, _now: Timestamp) -> bool {
        false
    }

    fn size_limit(&self) -> Option<u64> {
        Some(self.0)
    }
}

impl Cache {
    /// Applies `strategies` (defaulting to `[Expired]` if empty) to the
    /// index: removes every entry selected by any non-size strategy,
    /// extends the removal set with the size pass's output if a
    /// [`ToSize`] strategy is present, then removes each selected
    /// checkout's on-disk directory, in-memory handle, and index entry.
    /// Filesystem removal errors are tolerated per entry; persisting the
    /// index is not.
    #[instrument(skip(self, strategies))]
    pub async fn prune(&self, strategies: &[&dyn PruneStrategy]) -> Result<usize, CacheError> {
        let now = time::now();
        let mut state = self.state.write().await;

        let size_limit = strategies.iter().find_map(|s| s.size_limit());
        let other: Vec<&&dyn PruneStrategy> = strategies
            .iter()
            .filter(|s| s.size_limit().is_none())
            .collect();
        let other_effective: Vec<&dyn PruneStrategy> = if other.is_empty() && size_limit.is_none() {
            vec![&Expired]
        } else {
            other.into_iter().copied().collect()
        };

        let entries = state.index.list();
        let mut to_remove: Vec<String> = entries
            .iter()
            .filter(|(_, meta)| other_effective.iter().any(|s| s.should_prune(meta, now)))
            .map(|(key, _)| key.clone())
            .collect();

        if let Some(max_bytes) = size_limit {
            let already: std::collections::HashSet<&str> = to_remove.iter().map(String::as_str).collect();
            let size_candidates = self.size_pass(&entries, &already, max_bytes)?;
            for key in size_candidates {
                if !to_remove.contains(&key) {
                    to_remove.push(key);
                }
            }
        }

        for key in &to_remove {
            if let Some(entry) = state.checkouts.remove(key) {
                if let Err(err) = self.fs.remove_dir_all(&self.rel(&entry.path)) {
                    warn!(key = %key, error = %err, "failed to remove checkout directory during prune");
                }
            }
            state.index.delete_by_str(key);
        }

        let removed = to_remove.len();
        state.index.save(self.fs.as_ref(), &self.rel(&self.index_path))?;
        Ok(removed)
    }

    /// Computes current aggregate disk usage across tracked checkouts; if
    /// already under `max_bytes`, returns no candidates. Otherwise sorts
    /// every not-already-marked ephemeral entry by `lastAccess` ascending
    /// (LRU first) and greedily marks entries until the cumulative
    /// subtracted size would bring the total under the limit.
    fn size_pass(
        &self,
        entries: &[(String, CheckoutMetadata)],
        already_marked: &std::collections::HashSet<&str>,
        max_bytes: u64,
    ) -> Result<Vec<String>, CacheError> {
        let mut total = 0u64;
        let mut sizes = std::collections::HashMap::new();
        for (key, _) in entries {
            let size = self.fs.dir_size(&self.rel(&self.checkout_root.join(key)))?;
            sizes.insert(key.clone(), size);
            total += size;
        }

        if total <= max_bytes {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<&(String, CheckoutMetadata)> = entries
            .iter()
            .filter(|(key, meta)| !already_marked.contains(key.as_str()) && !meta.is_persistent())
            .collect();
        candidates.sort_by_key(|(_, meta)| meta.last_access);

        let mut removed = Vec::new();
        for (key, _) in candidates {
            if total <= max_bytes {
                break;
            }
            total = total.saturating_sub(*sizes.get(key).unwrap_or(&0));
            removed.push(key.clone());
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use jiff::Timestamp;

    use crate::cache::Cache;
    use crate::key::{normalize, CompositeKey};
    use crate::options::GetOptions;

    use super::{Expired, OlderThan, ToSize};

    fn past(seconds_ago: u64) -> Timestamp {
        let now = Timestamp::now();
        let nanos = i128::from(now.as_nanosecond()) - i128::from(seconds_ago) * 1_000_000_000;
        Timestamp::from_nanosecond(nanos).unwrap()
    }

    fn future(seconds_ahead: u64) -> Timestamp {
        let now = Timestamp::now();
        let nanos = i128::from(now.as_nanosecond()) + i128::from(seconds_ahead) * 1_000_000_000;
        Timestamp::from_nanosecond(nanos).unwrap()
    }

    async fn backdate(
        cache: &Cache,
        key: &CompositeKey,
        last_access: Timestamp,
        expires_at: Option<Timestamp>,
    ) {
        let mut state = cache.state.write().await;
        let mut meta = state.index.get(key).cloned().unwrap();
        meta.last_access = last_access;
        meta.expires_at = expires_at;
        state.index.set(key, meta);
    }

    #[tokio::test]
    async fn expired_strategy_removes_entries_past_expires_at() {
        let (cache, tmp) = crate::testing::temp_cache().await;
        let (origin_path, _sha) = crate::testing::init_origin(tmp.path(), "README.md", "hello");
        let url = origin_path.to_string_lossy().to_string();

        let checkout_path = cache
            .get_checkout(
                &url,
                "ck",
                GetOptions::new().with_ref("master").with_ttl(Duration::from_secs(3600)),
            )
            .await
            .unwrap();

        let key = CompositeKey::new(normalize(&url), "master", "ck");
        backdate(&cache, &key, past(10), Some(past(1))).await;

        let removed = cache.prune(&[&Expired]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!checkout_path.exists());
        assert_eq!(cache.stats().await.unwrap().checkout_count, 0);
    }

    #[tokio::test]
    async fn expired_strategy_never_removes_persistent_entries() {
        let (cache, tmp) = crate::testing::temp_cache().await;
        let (origin_path, _sha) = crate::testing::init_origin(tmp.path(), "README.md", "hello");
        let url = origin_path.to_string_lossy().to_string();

        let checkout_path = cache
            .get_checkout(&url, "ck", GetOptions::new().with_ref("master"))
            .await
            .unwrap();
        let key = CompositeKey::new(normalize(&url), "master", "ck");
        backdate(&cache, &key, past(3600), None).await;

        let removed = cache.prune(&[&Expired]).await.unwrap();
        assert_eq!(removed, 0);
        assert!(checkout_path.exists());
    }

    #[tokio::test]
    async fn older_than_strategy_removes_stale_ephemeral_entries() {
        let (cache, tmp) = crate::testing::temp_cache().await;
        let (origin_path, _sha) = crate::testing::init_origin(tmp.path(), "README.md", "hello");
        let url = origin_path.to_string_lossy().to_string();

        let checkout_path = cache
            .get_checkout(
                &url,
                "ck",
                GetOptions::new().with_ref("master").with_ttl(Duration::from_secs(3600)),
            )
            .await
            .unwrap();

        let key = CompositeKey::new(normalize(&url), "master", "ck");
        backdate(&cache, &key, past(3600), Some(past(0))).await;

        let removed = cache.prune(&[&OlderThan(Duration::from_secs(60))]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!checkout_path.exists());
    }

    #[tokio::test]
    async fn older_than_strategy_never_removes_persistent_entries() {
        let (cache, tmp) = crate::testing::temp_cache().await;
        let (origin_path, _sha) = crate::testing::init_origin(tmp.path(), "README.md", "hello");
        let url = origin_path.to_string_lossy().to_string();

        let checkout_path = cache
            .get_checkout(&url, "ck", GetOptions::new().with_ref("master"))
            .await
            .unwrap();
        let key = CompositeKey::new(normalize(&url), "master", "ck");
        backdate(&cache, &key, past(3600), None).await;

        let removed = cache.prune(&[&OlderThan(Duration::from_secs(60))]).await.unwrap();
        assert_eq!(removed, 0);
        assert!(checkout_path.exists());
    }

    #[tokio::test]
    async fn to_size_strategy_exempts_persistent_entries() {
        let (cache, tmp) = crate::testing::temp_cache().await;
        let (origin_path, _sha) = crate::testing::init_origin(tmp.path(), "README.md", "hello");
        let url = origin_path.to_string_lossy().to_string();

        let persistent_path = cache
            .get_checkout(&url, "persistent", GetOptions::new().with_ref("master"))
            .await
            .unwrap();
        let ephemeral_path = cache
            .get_checkout(
                &url,
                "ephemeral",
                GetOptions::new().with_ref("master").with_ttl(Duration::from_secs(3600)),
            )
            .await
            .unwrap();

        let removed = cache.prune(&[&ToSize(0)]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(persistent_path.exists());
        assert!(!ephemeral_path.exists());
    }

    #[tokio::test]
    async fn prune_strategies_combine_with_or_semantics() {
        let (cache, tmp) = crate::testing::temp_cache().await;
        let (origin_path, _sha) = crate::testing::init_origin(tmp.path(), "README.md", "hello");
        let url = origin_path.to_string_lossy().to_string();

        cache
            .get_checkout(
                &url,
                "expired-only",
                GetOptions::new().with_ref("master").with_ttl(Duration::from_secs(3600)),
            )
            .await
            .unwrap();
        cache
            .get_checkout(
                &url,
                "stale-only",
                GetOptions::new().with_ref("master").with_ttl(Duration::from_secs(3600)),
            )
            .await
            .unwrap();

        let expired_key = CompositeKey::new(normalize(&url), "master", "expired-only");
        backdate(&cache, &expired_key, past(1), Some(past(1))).await;
        let stale_key = CompositeKey::new(normalize(&url), "master", "stale-only");
        backdate(&cache, &stale_key, past(3600), Some(future(3600))).await;

        let removed = cache
            .prune(&[&Expired, &OlderThan(Duration::from_secs(60))])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.stats().await.unwrap().checkout_count, 0);
    }

    #[tokio::test]
    async fn empty_strategy_slice_defaults_to_expired_only() {
        let (cache, tmp) = crate::testing::temp_cache().await;
        let (origin_path, _sha) = crate::testing::init_origin(tmp.path(), "README.md", "hello");
        let url = origin_path.to_string_lossy().to_string();

        cache
            .get_checkout(
                &url,
                "expired",
                GetOptions::new().with_ref("master").with_ttl(Duration::from_secs(3600)),
            )
            .await
            .unwrap();
        cache
            .get_checkout(
                &url,
                "stale-but-not-expired",
                GetOptions::new().with_ref("master").with_ttl(Duration::from_secs(3600)),
            )
            .await
            .unwrap();

        let expired_key = CompositeKey::new(normalize(&url), "master", "expired");
        backdate(&cache, &expired_key, past(1), Some(past(1))).await;
        let stale_key = CompositeKey::new(normalize(&url), "master", "stale-but-not-expired");
        backdate(&cache, &stale_key, past(3600), Some(future(3600))).await;

        let removed = cache.prune(&[]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.stats().await.unwrap().checkout_count, 1);
    }
}
