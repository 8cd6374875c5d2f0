//! Delivery-id dedup window (§4.9: "Replays ... within a dedup window are
//! dropped"). A bounded LRU of recently seen delivery ids, grounded on the
//! same `moka::sync::Cache` shape as `auth::session_cache::RevocationCache`.

use std::time::Duration;

const DEFAULT_CAPACITY: u64 = 50_000;
const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

pub struct DeliveryDedup {
    seen: moka::sync::Cache<String, ()>,
}

impl DeliveryDedup {
    pub fn new(capacity: u64, ttl_secs: u64) -> Self {
        Self {
            seen: moka::sync::Cache::builder()
                .max_capacity(capacity)
                .time_to_live(Duration::from_secs(ttl_secs))
                .build(),
        }
    }

    /// Returns `true` if `delivery_id` has already been seen within the
    /// window, recording it either way.
    pub fn is_replay(&self, delivery_id: &str) -> bool {
        if self.seen.get(delivery_id).is_some() {
            return true;
        }
        self.seen.insert(delivery_id.to_string(), ());
        false
    }
}

impl Default for DeliveryDedup {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delivery_is_not_a_replay() {
        let dedup = DeliveryDedup::default();
        assert!(!dedup.is_replay("delivery-1"));
    }

    #[test]
    fn repeated_delivery_is_a_replay() {
        let dedup = DeliveryDedup::default();
        assert!(!dedup.is_replay("delivery-1"));
        assert!(dedup.is_replay("delivery-1"));
    }

    #[test]
    fn distinct_deliveries_are_independent() {
        let dedup = DeliveryDedup::default();
        assert!(!dedup.is_replay("delivery-1"));
        assert!(!dedup.is_replay("delivery-2"));
    }
}
