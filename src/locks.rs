//! Per-entity serialization
//!
//! One logical writer per trade / job id. Different ids never contend.
//! Guards must be dropped before any custodian or notification call.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    slots: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Acquire the writer slot for `key`, waiting behind any current holder
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the DashMap shard lock is released before awaiting
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        slot.lock_owned().await
    }

    /// Drop slots nobody holds or waits on
    pub fn prune(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        before - self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::<u64>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&7).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::<u64>::new();
        let _a = locks.lock(&1).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(&2)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_prune_releases_idle_slots() {
        let locks = KeyedLocks::<u64>::new();
        {
            let _g = locks.lock(&1).await;
            assert_eq!(locks.prune(), 0);
        }
        assert_eq!(locks.len(), 1);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
