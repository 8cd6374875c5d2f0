//! Build coalescing (§4.5 contract: "builds for `(service, git_sha)` are
//! idempotent"). A concurrent request for a key already building waits on
//! the in-flight build's completion notification instead of starting a
//! second one; grounded on the teacher's `oauth_code_store`/
//! `oauth_state_store` bounded `moka::future::Cache` pattern in
//! `server/state.rs`, generalized from OAuth codes to build keys.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct BuildKey {
    pub service_id: Uuid,
    pub git_sha: String,
}

/// What a caller gets back from `join_or_start`: either it is now
/// responsible for running the build and notifying waiters, or it should
/// await the in-flight build that's already running.
pub enum Coalesced {
    Leader(Arc<Notify>),
    Follower(Arc<Notify>),
}

pub struct BuildCoalescer {
    in_flight: moka::future::Cache<BuildKey, Arc<Notify>>,
}

impl BuildCoalescer {
    /// A build stuck without ever notifying (e.g. the task that held the
    /// leader slot panicked) self-heals after this TTL rather than wedging
    /// all followers forever.
    const STALE_AFTER: Duration = Duration::from_secs(35 * 60);

    pub fn new() -> Self {
        Self {
            in_flight: moka::future::Cache::builder()
                .time_to_live(Self::STALE_AFTER)
                .max_capacity(10_000)
                .build(),
        }
    }

    /// Registers `key` as in-flight, or returns the existing marker if
    /// another request got there first. `get_with`'s init future only runs
    /// on a cache miss, so comparing the returned marker against the
    /// candidate by pointer identity tells leader from follower.
    pub async fn join_or_start(&self, key: BuildKey) -> Coalesced {
        let candidate = Arc::new(Notify::new());
        let marker = self
            .in_flight
            .get_with(key, {
                let candidate = candidate.clone();
                async move { candidate }
            })
            .await;

        if Arc::ptr_eq(&marker, &candidate) {
            Coalesced::Leader(marker)
        } else {
            Coalesced::Follower(marker)
        }
    }

    /// The leader calls this once the Release has been finalized (ready or
    /// failed), waking every follower waiting on the same key.
    pub async fn finish(&self, key: &BuildKey, notify: &Notify) {
        self.in_flight.invalidate(key).await;
        notify.notify_waiters();
    }
}

impl Default for BuildCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> BuildKey {
        BuildKey {
            service_id: Uuid::nil(),
            git_sha: "abc123".to_string(),
        }
    }

    #[tokio::test]
    async fn second_caller_for_same_key_follows_the_first() {
        let coalescer = BuildCoalescer::new();
        let first = coalescer.join_or_start(key()).await;
        assert!(matches!(first, Coalesced::Leader(_)));

        let second = coalescer.join_or_start(key()).await;
        assert!(matches!(second, Coalesced::Follower(_)));
    }

    #[tokio::test]
    async fn finishing_releases_the_key_for_a_fresh_build() {
        let coalescer = BuildCoalescer::new();
        let notify = match coalescer.join_or_start(key()).await {
            Coalesced::Leader(n) => n,
            Coalesced::Follower(_) => panic!("expected leader"),
        };
        coalescer.finish(&key(), &notify).await;

        let again = coalescer.join_or_start(key()).await;
        assert!(matches!(again, Coalesced::Leader(_)));
    }
}
