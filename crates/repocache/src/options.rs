use std::time::Duration;

use repocache_git::GitAuth;

/// Per-call options for [`crate::Cache::get_checkout`].
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub(crate) update: bool,
    pub(crate) auth: Option<GitAuth>,
    pub(crate) depth: Option<u32>,
    pub(crate) r#ref: Option<String>,
    pub(crate) ttl: Option<Duration>,
}

impl GetOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes the bare store and, if the checkout was already cached,
    /// the working tree, before returning.
    #[must_use]
    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    /// Authentication material forwarded to the repository driver.
    #[must_use]
    pub fn with_auth(mut self, auth: GitAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Shallow clone depth; `0` (or never calling this) means full.
    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// The revision to check out. If never set, the bare's current `HEAD`
    /// short name (after resolution) is used.
    #[must_use]
    pub fn with_ref(mut self, r#ref: impl Into<String>) -> Self {
        self.r#ref = Some(r#ref.into());
        self
    }

    /// Marks the checkout ephemeral, eligible for pruning once `ttl`
    /// elapses since its last access.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub(crate) fn depth_or_full(&self) -> Option<u32> {
        match self.depth {
            Some(0) | None => None,
            Some(depth) => Some(depth),
        }
    }
}
