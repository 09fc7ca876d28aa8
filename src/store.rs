//! Shared bounded store primitives backing the caches, dedup map, and
//! rate-limit windows (§5, §9: "replace ad-hoc process-global maps with an
//! explicit Store capability... expose get/put/cas with per-key atomicity").

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// A value with an absolute expiry instant.
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A TTL-bounded key/value store with per-key compare-and-swap. Expired
/// entries are swept lazily on access rather than by a background task,
/// matching the teacher's bounded-collection-pruned-on-touch style.
pub struct Store<K, V> {
    inner: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> Default for Store<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a value if present and not expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let guard = self.inner.read().await;
        guard
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    /// Insert or overwrite a key with the given TTL.
    pub async fn put(&self, key: K, value: V, ttl: Duration) {
        let mut guard = self.inner.write().await;
        guard.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Insert only if the key is absent or expired; returns `true` if this
    /// call performed the insert (the compare-and-swap succeeded).
    pub async fn put_if_absent(&self, key: K, value: V, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut guard = self.inner.write().await;
        let occupied = guard
            .get(&key)
            .map(|entry| entry.expires_at > now)
            .unwrap_or(false);
        if occupied {
            return false;
        }
        guard.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        true
    }

    /// Remove every expired entry. Not required for correctness (reads
    /// already filter on expiry) but keeps memory bounded over time.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut guard = self.inner.write().await;
        guard.retain(|_, entry| entry.expires_at > now);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

/// A bounded, newest-first ring buffer. Pushing past `capacity` drops the
/// oldest entry, mirroring the card queue's "prune to last N" behavior.
pub struct Ring<T> {
    capacity: usize,
    inner: RwLock<VecDeque<T>>,
}

impl<T: Clone> Ring<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Push a new item to the front (newest-first), trimming from the tail
    /// if the ring is over capacity.
    pub async fn push_front(&self, item: T) {
        let mut guard = self.inner.write().await;
        guard.push_front(item);
        while guard.len() > self.capacity {
            guard.pop_back();
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn to_vec(&self) -> Vec<T> {
        self.inner.read().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store: Store<String, u32> = Store::new();
        store.put("a".into(), 1, Duration::from_secs(60)).await;
        assert_eq!(store.get(&"a".to_string()).await, Some(1));
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let store: Store<String, u32> = Store::new();
        store.put("a".into(), 1, Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get(&"a".to_string()).await, None);
    }

    #[tokio::test]
    async fn put_if_absent_rejects_live_key() {
        let store: Store<String, u32> = Store::new();
        assert!(store.put_if_absent("a".into(), 1, Duration::from_secs(60)).await);
        assert!(!store.put_if_absent("a".into(), 2, Duration::from_secs(60)).await);
        assert_eq!(store.get(&"a".to_string()).await, Some(1));
    }

    #[tokio::test]
    async fn put_if_absent_accepts_expired_key() {
        let store: Store<String, u32> = Store::new();
        store.put_if_absent("a".into(), 1, Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.put_if_absent("a".into(), 2, Duration::from_secs(60)).await);
        assert_eq!(store.get(&"a".to_string()).await, Some(2));
    }

    #[tokio::test]
    async fn ring_bounds_length() {
        let ring: Ring<u32> = Ring::new(3);
        for i in 0..5 {
            ring.push_front(i).await;
        }
        assert_eq!(ring.len().await, 3);
        assert_eq!(ring.to_vec().await, vec![4, 3, 2]);
    }
}
