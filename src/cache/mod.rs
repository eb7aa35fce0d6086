//! Cache-aside layer in front of the resolvers.
//!
//! Keys combine the source name and the looked-up address, so the same
//! address resolved through different sources occupies distinct slots.
//! Entries have no TTL; only eviction removes them. A dataset refresh does
//! not invalidate cached records; the staleness window until natural
//! eviction is accepted.

mod adaptive;

pub use adaptive::AdaptiveCache;

use crate::record::GeoRecord;

const KEY_SEPARATOR: &str = "--";

/// Fixed-capacity cache of resolved records, shared by all request
/// workers. `fetch` is a pure read and a miss is a normal outcome; `add`
/// always succeeds, eviction being an internal detail.
pub struct LookupCache {
    inner: AdaptiveCache<String, GeoRecord>,
}

impl LookupCache {
    pub fn new(capacity: usize) -> Self {
        LookupCache {
            inner: AdaptiveCache::new(capacity),
        }
    }

    pub fn fetch(&self, source: &str, address: &str) -> Option<GeoRecord> {
        self.inner.get(&cache_key(source, address))
    }

    pub fn add(&self, source: &str, record: &GeoRecord) {
        self.inner.put(cache_key(source, &record.address), record.clone());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

fn cache_key(source: &str, address: &str) -> String {
    format!("{source}{KEY_SEPARATOR}{address}")
}
