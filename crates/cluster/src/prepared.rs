use std::time::Duration;

use cqlkit_domain::{PreparedId, PreparedStatement};
use moka::sync::Cache;

/// Per-session cache of prepared statements keyed by their id, which is
/// derived from the keyspace and query text.
#[derive(Debug, Clone)]
pub struct PreparedCache {
    entries: Cache<PreparedId, PreparedStatement>,
}

impl PreparedCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
    pub const DEFAULT_CAPACITY: u64 = 1_000;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity.max(1))
                .build(),
        }
    }

    pub fn get(&self, id: &PreparedId) -> Option<PreparedStatement> {
        self.entries.get(id)
    }

    pub fn insert(&self, prepared: PreparedStatement) {
        self.entries.insert(prepared.id(), prepared);
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for PreparedCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
