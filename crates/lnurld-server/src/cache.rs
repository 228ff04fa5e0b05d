//! Bounded, optionally expiring in-memory cache.
//!
//! Backs the auth challenge table, the withdrawal grant table and the
//! terminal-invoice cache. Entries are kept in recency order: reads move an
//! entry to the back, inserts beyond capacity evict from the front.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Source of the current time, injected so expiry can be tested.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct BoundedCache<K, V> {
    name: &'static str,
    entries: Mutex<IndexMap<K, Entry<V>>>,
    capacity: usize,
    ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    /// `ttl = None` keeps entries until evicted by capacity.
    pub fn new(
        name: &'static str,
        capacity: usize,
        ttl: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            entries: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
            ttl,
            clock,
        }
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.inserted_at) >= ttl)
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().await;
        entries.shift_remove(&key);
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: self.clock.now(),
            },
        );
        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
            debug!(cache = self.name, "Evicted least recently used entry");
        }
    }

    /// Live value for `key`, marking it as most recently used.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.with_entry(key, |value| value.map(|v| v.clone())).await
    }

    /// Run `f` on the live entry for `key` (or `None`) while holding the
    /// cache lock, so a check and the update that follows it are atomic.
    pub async fn with_entry<R>(&self, key: &K, f: impl FnOnce(Option<&mut V>) -> R) -> R {
        let mut entries = self.entries.lock().await;
        let now = self.clock.now();

        let expired = entries
            .get(key)
            .is_some_and(|entry| self.is_expired(entry, now));
        if expired {
            entries.shift_remove(key);
        }

        match entries.get_index_of(key) {
            Some(index) => {
                let last = entries.len() - 1;
                entries.move_index(index, last);
                f(entries.get_mut(key).map(|entry| &mut entry.value))
            }
            None => f(None),
        }
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().await;
        entries.shift_remove(key).map(|entry| entry.value)
    }

    /// Drop expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = self.clock.now();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(cache = self.name, removed, "Purged expired entries");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
pub(crate) struct ManualClock {
    now: std::sync::Mutex<Instant>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            now: std::sync::Mutex::new(Instant::now()),
        })
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let cache = BoundedCache::new("test", 2, None, Arc::new(SystemClock));
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;
        assert_eq!(cache.get(&"a").await, Some(1));
        cache.insert("c", 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&"b").await, None);
        assert_eq!(cache.get(&"a").await, Some(1));
        assert_eq!(cache.get(&"c").await, Some(3));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let clock = ManualClock::new();
        let cache = BoundedCache::new("test", 8, Some(Duration::from_secs(300)), clock.clone());
        cache.insert("k1", "value").await;

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get(&"k1").await, Some("value"));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"k1").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let clock = ManualClock::new();
        let cache = BoundedCache::new("test", 8, Some(Duration::from_secs(60)), clock.clone());
        cache.insert(1, ()).await;
        clock.advance(Duration::from_secs(30));
        cache.insert(2, ()).await;
        clock.advance(Duration::from_secs(30));

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_with_entry_updates_in_place() {
        let cache = BoundedCache::new("test", 8, None, Arc::new(SystemClock));
        cache.insert("k1", None::<String>).await;

        let bound = cache
            .with_entry(&"k1", |entry| match entry {
                Some(slot) if slot.is_none() => {
                    *slot = Some("key".to_string());
                    true
                }
                _ => false,
            })
            .await;
        assert!(bound);
        assert_eq!(cache.get(&"k1").await, Some(Some("key".to_string())));
        assert_eq!(cache.remove(&"k1").await, Some(Some("key".to_string())));
        assert!(!cache.with_entry(&"k1", |entry| entry.is_some()).await);
    }
}
