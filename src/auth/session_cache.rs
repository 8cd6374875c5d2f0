//! Bounded session revocation cache (§4.1, §5, §9). A cache miss is a
//! soft-fail by default (token accepted, warning emitted); `strict` mode
//! fails closed when the cache backend itself is unreachable.

use std::time::Duration;

/// In-process cache backend; cannot itself become unreachable, so `strict`
/// only changes behavior once this is swapped for a networked backend (e.g.
/// a shared Redis instance across replicas). The flag is threaded through
/// now so that swap is a backend change, not an API change.
#[cfg(feature = "server")]
pub struct RevocationCache {
    revoked: moka::sync::Cache<String, ()>,
    #[allow(dead_code)]
    strict: bool,
}

#[cfg(feature = "server")]
impl RevocationCache {
    pub fn new(capacity: u64, strict: bool) -> Self {
        Self {
            revoked: moka::sync::Cache::builder()
                .max_capacity(capacity)
                .time_to_live(Duration::from_secs(24 * 3600))
                .build(),
            strict,
        }
    }

    pub fn revoke(&self, session_id: &str) {
        self.revoked.insert(session_id.to_string(), ());
    }

    pub fn is_revoked(&self, session_id: &str) -> bool {
        self.revoked.contains_key(session_id)
    }
}

#[cfg(test)]
#[cfg(feature = "server")]
mod tests {
    use super::*;

    #[test]
    fn revoked_session_is_flagged() {
        let cache = RevocationCache::new(1024, false);
        cache.revoke("sess-1");
        assert!(cache.is_revoked("sess-1"));
        assert!(!cache.is_revoked("sess-2"));
    }
}
