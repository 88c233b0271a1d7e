use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::time;

/// Per-checkout lifecycle data, persisted in the [`crate::index::Index`].
///
/// The presence of `ttl` is the sole distinction between a persistent
/// checkout (no `ttl`, never auto-pruned) and an ephemeral one (`ttl`
/// present, eligible for `Expired`/`OlderThan`/`ToSize` pruning).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    /// The original, non-normalized URL the caller supplied.
    pub url: String,
    pub r#ref: String,
    pub cache_key: String,
    pub created_at: Timestamp,
    pub last_access: Timestamp,
    #[serde(with = "time::duration_nanos", default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl CheckoutMetadata {
    /// Builds a fresh record for a just-materialized checkout:
    /// `createdAt = lastAccess = now`, `expiresAt = now + ttl` when `ttl`
    /// is present.
    pub fn new(
        url: impl Into<String>,
        r#ref: impl Into<String>,
        cache_key: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Result<Self, CacheError> {
        let now = time::now();
        let expires_at = ttl.map(|d| time::add(now, d)).transpose()?;
        Ok(Self {
            url: url.into(),
            r#ref: r#ref.into(),
            cache_key: cache_key.into(),
            created_at: now,
            last_access: now,
            ttl,
            expires_at,
        })
    }

    /// Sets `lastAccess = now` and, if `ttl` is present, recomputes
    /// `expiresAt = lastAccess + ttl` so the two stay consistent.
    pub fn touch(&mut self) -> Result<(), CacheError> {
        let now = time::now();
        self.last_access = now;
        self.expires_at = self.ttl.map(|d| time::add(now, d)).transpose()?;
        Ok(())
    }

    /// Whether this checkout has no TTL and is therefore exempt from every
    /// pruning strategy.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.ttl.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_without_ttl_has_no_expiration() {
        let meta = CheckoutMetadata::new("u", "main", "k", None).unwrap();
        assert!(meta.expires_at.is_none());
        assert!(meta.is_persistent());
    }

    #[test]
    fn new_with_ttl_derives_expires_at() {
        let ttl = Duration::from_secs(60);
        let meta = CheckoutMetadata::new("u", "main", "k", Some(ttl)).unwrap();
        assert_eq!(time::elapsed(meta.expires_at.unwrap(), meta.last_access), ttl);
        assert!(!meta.is_persistent());
    }

    #[test]
    fn touch_keeps_expires_at_consistent_with_ttl() {
        let ttl = Duration::from_secs(30);
        let mut meta = CheckoutMetadata::new("u", "main", "k", Some(ttl)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        meta.touch().unwrap();
        assert_eq!(time::elapsed(meta.expires_at.unwrap(), meta.last_access), ttl);
    }
}
