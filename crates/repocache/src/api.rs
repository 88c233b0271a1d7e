//! The public entry points tying the bare store, checkout store, and
//! index together: `getCheckout`, `removeCheckout`, `clear`, `clearAll`,
//! and `stats`.

use tracing::{instrument, warn};

use crate::cache::Cache;
use crate::error::CacheError;
use crate::index::Index;
use crate::key::{normalize, CompositeKey};
use crate::metadata::CheckoutMetadata;
use crate::options::GetOptions;
use crate::stats::CacheStats;

impl Cache {
    /// Returns the working-tree path for `(url, cacheKey)`, materializing
    /// the bare store and the checkout on demand.
    ///
    /// Resolves `url` to a [`crate::key::NormalizedUrl`], ensures the bare
    /// store exists (cloning it on first use), optionally refreshes it,
    /// picks a ref (`opts`'s, or the bare's current `HEAD` otherwise),
    /// ensures the checkout exists at `normalizedURL/ref/cacheKey`, and
    /// upserts the index entry's lifecycle metadata before persisting it.
    #[instrument(skip(self, opts), fields(url = %url, cache_key = %cache_key))]
    pub async fn get_checkout(
        &self,
        url: &str,
        cache_key: &str,
        opts: GetOptions,
    ) -> Result<std::path::PathBuf, CacheError> {
        let normalized = normalize(url);
        let bare_path = self.ensure_bare(&normalized, url, &opts).await?;
        if opts.update {
            self.update_bare(&bare_path, &opts).await?;
        }

        let r#ref = match &opts.r#ref {
            Some(r) => r.clone(),
            None => self.default_ref(&bare_path).await?,
        };

        let key = CompositeKey::new(normalized, r#ref.clone(), cache_key.to_string());
        let checkout_path = self.ensure_checkout(&key, &bare_path, &opts).await?;

        {
            let mut state = self.state.write().await;
            if state.index.get(&key).is_some() {
                state.index.update_last_access(&key)?;
            } else {
                let metadata = CheckoutMetadata::new(url, &r#ref, cache_key, opts.ttl)?;
                state.index.set(&key, metadata);
            }
            state.index.save(self.fs.as_ref(), &self.rel(&self.index_path))?;
        }

        Ok(checkout_path)
    }

    /// Removes every checkout matching `(url, cacheKey)` across all refs.
    /// Fails with [`CacheError::NotFound`] if none exist. The bare store
    /// for `url` is left untouched.
    #[instrument(skip(self), fields(url = %url, cache_key = %cache_key))]
    pub async fn remove_checkout(&self, url: &str, cache_key: &str) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        let matches: Vec<String> = state
            .index
            .filter_by_url(url)
            .into_iter()
            .filter(|(_, meta)| meta.cache_key == cache_key)
            .map(|(key, _)| key)
            .collect();

        if matches.is_empty() {
            return Err(CacheError::NotFound {
                url: url.to_string(),
                cache_key: cache_key.to_string(),
            });
        }

        for key in &matches {
            if let Some(entry) = state.checkouts.remove(key) {
                if let Err(err) = self.fs.remove_dir_all(&self.rel(&entry.path)) {
                    warn!(key = %key, error = %err, "failed to remove checkout directory");
                }
            }
            state.index.delete_by_str(key);
        }

        state.index.save(self.fs.as_ref(), &self.rel(&self.index_path))?;
        Ok(())
    }

    /// Drops the bare store and every checkout for `url`.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn clear(&self, url: &str) -> Result<(), CacheError> {
        let normalized = normalize(url);
        let mut state = self.state.write().await;

        let checkout_keys: Vec<String> = state
            .index
            .filter_by_url(url)
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        for key in &checkout_keys {
            if let Some(entry) = state.checkouts.remove(key) {
                if let Err(err) = self.fs.remove_dir_all(&self.rel(&entry.path)) {
                    warn!(key = %key, error = %err, "failed to remove checkout directory");
                }
            }
            state.index.delete_by_str(key);
        }

        if let Some(bare) = state.bares.remove(&normalized) {
            if let Err(err) = self.fs.remove_dir_all(&self.rel(&bare.path)) {
                warn!(url = %normalized, error = %err, "failed to remove bare repository directory");
            }
        }

        state.index.save(self.fs.as_ref(), &self.rel(&self.index_path))?;
        Ok(())
    }

    /// Drops every bare store and checkout, recreating an empty cache at
    /// the same `base_path`.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.bares.clear();
        state.checkouts.clear();

        self.fs.remove_dir_all(&self.rel(&self.bare_root))?;
        self.fs.remove_dir_all(&self.rel(&self.checkout_root))?;
        self.fs.create_dir_all(&self.rel(&self.bare_root))?;
        self.fs.create_dir_all(&self.rel(&self.checkout_root))?;

        state.index = Index::empty();
        state.index.save(self.fs.as_ref(), &self.rel(&self.index_path))?;
        Ok(())
    }

    /// A snapshot of cache occupancy: counts and aggregate on-disk sizes
    /// for both tiers, plus the oldest/newest checkout creation times.
    ///
    /// Bare counts/bytes are derived from the index's distinct normalized
    /// URLs rather than the in-memory `bares` map, so a freshly restarted
    /// process (whose map is empty until a URL is touched again) still
    /// reports the bare directories its on-disk index already knows about.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let state = self.state.read().await;

        let entries = state.index.list();

        let bare_urls: std::collections::HashSet<crate::key::NormalizedUrl> = entries
            .iter()
            .map(|(_, meta)| crate::key::normalize(&meta.url))
            .collect();
        let mut bare_bytes = 0u64;
        for url in &bare_urls {
            bare_bytes += self.fs.dir_size(&self.rel(&self.bare_path(url)))?;
        }

        let mut checkout_bytes = 0u64;
        for (key, _) in &entries {
            checkout_bytes += self.fs.dir_size(&self.rel(&self.checkout_root.join(key)))?;
        }

        let oldest_created_at = entries.iter().map(|(_, meta)| meta.created_at).min();
        let newest_created_at = entries.iter().map(|(_, meta)| meta.created_at).max();

        Ok(CacheStats {
            bare_count: bare_urls.len(),
            checkout_count: entries.len(),
            bare_bytes,
            checkout_bytes,
            oldest_created_at,
            newest_created_at,
        })
    }
}
