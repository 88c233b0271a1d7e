use jiff::Timestamp;

/// A point-in-time snapshot of cache occupancy.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub bare_count: usize,
    pub checkout_count: usize,
    pub bare_bytes: u64,
    pub checkout_bytes: u64,
    pub oldest_created_at: Option<Timestamp>,
    pub newest_created_at: Option<Timestamp>,
}
