//! Per-`(project, environment)` serialization (§4.6, §8): "within a
//! (project, environment), groups serialize ... across pairs, groups run
//! concurrently." A bounded `moka` map of per-key mutexes generalizes the
//! teacher's single global `run_project_controller_loop` background-loop
//! pattern to one serialized executor per key.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct GroupKey {
    pub project_id: Uuid,
    pub environment_id: Uuid,
}

/// Hands out one lock per `(project, environment)`. The map itself is
/// capacity-bounded (§5: "no unbounded growth"); an idle key's lock is
/// evicted and transparently rebuilt on next use, which is safe since an
/// uncontended mutex carries no state worth preserving.
pub struct GroupSerializer {
    locks: moka::sync::Cache<GroupKey, Arc<Mutex<()>>>,
}

impl GroupSerializer {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            locks: moka::sync::Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// Awaits exclusive execution rights for `key`. Holding the returned
    /// guard is what it means for a group to be "executing" for this pair;
    /// a second `CreateGroup` call for the same pair blocks here until the
    /// prior group's guard is dropped.
    pub async fn acquire(&self, key: GroupKey) -> OwnedMutexGuard<()> {
        let mutex = self.locks.get_with(key, || Arc::new(Mutex::new(())));
        mutex.lock_owned().await
    }
}

impl Default for GroupSerializer {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let serializer = GroupSerializer::default();
        let a = GroupKey {
            project_id: Uuid::new_v4(),
            environment_id: Uuid::new_v4(),
        };
        let b = GroupKey {
            project_id: Uuid::new_v4(),
            environment_id: Uuid::new_v4(),
        };

        let guard_a = serializer.acquire(a).await;
        let guard_b = tokio::time::timeout(std::time::Duration::from_millis(200), serializer.acquire(b)).await;
        assert!(guard_b.is_ok());
        drop(guard_a);
    }

    #[tokio::test]
    async fn same_key_serializes() {
        let serializer = GroupSerializer::default();
        let key = GroupKey {
            project_id: Uuid::new_v4(),
            environment_id: Uuid::new_v4(),
        };

        let guard = serializer.acquire(key).await;
        let second = tokio::time::timeout(std::time::Duration::from_millis(50), serializer.acquire(key)).await;
        assert!(second.is_err(), "second acquire should block while the first guard is held");
        drop(guard);
    }
}
