//! Local tier (C2) — a bounded, per-namespace in-process store with a
//! selectable eviction policy.
//!
//! Grounded on `GlobalCache` from the cachelito example (a `HashMap` of
//! entries plus a `VecDeque` recording insertion/access order, both behind
//! locks, with eviction dispatched on the configured policy). This
//! implementation collapses that example's two-lock split (separate
//! read/write lock on the map and a mutex on the order queue) into a
//! single `parking_lot::Mutex` over both structures together — the local
//! tier here is always byte-sized and the critical sections are short, so
//! the simpler single-lock design keeps the eviction bookkeeping trivially
//! consistent without sacrificing throughput.

use crate::backends::traits::LocalBackend;
use crate::descriptor::EvictionPolicy;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
    frequency: u64,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn weight(&self) -> u64 {
        self.value.len() as u64
    }
}

struct Inner {
    map: HashMap<String, Entry>,
    /// Ordering structure: for LRU/FIFO this is insertion/access order
    /// (front = oldest); for WEIGHT and LFU it is scanned linearly to find
    /// the eviction candidate since those policies order by a value rather
    /// than by recency.
    order: VecDeque<String>,
    total_weight: u64,
    /// Counts `get`/`put` calls since the last LFU decay; unused by other
    /// policies.
    activity: u64,
}

/// Number of `get`/`put` calls between LFU frequency halvings. Keeps a key
/// that was popular long ago from permanently outranking recently-active
/// keys (SPEC_FULL.md §4.2: "LFU (with aging)").
const LFU_DECAY_EVERY: u64 = 64;

/// Bounded in-process cache for one logical namespace.
pub struct LocalTier {
    inner: Mutex<Inner>,
    policy: EvictionPolicy,
    max_entries: u64,
    max_weight_bytes: u64,
}

impl LocalTier {
    #[must_use]
    pub fn new(policy: EvictionPolicy, max_entries: u64, max_weight_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                total_weight: 0,
                activity: 0,
            }),
            policy,
            max_entries,
            max_weight_bytes,
        }
    }

    fn touch_order(order: &mut VecDeque<String>, key: &str) {
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.to_string());
    }

    fn find_victim(&self, inner: &Inner) -> Option<String> {
        match self.policy {
            EvictionPolicy::Lru | EvictionPolicy::Fifo => inner.order.front().cloned(),
            EvictionPolicy::Lfu => inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.frequency)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Weight => inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.weight())
                .map(|(k, _)| k.clone()),
        }
    }

    /// Halves every entry's frequency counter every [`LFU_DECAY_EVERY`]
    /// activity ticks, so keys that were hot long ago lose their edge over
    /// keys that are hot now. No-op for policies other than LFU.
    fn tick_lfu_decay(&self, inner: &mut Inner) {
        if !matches!(self.policy, EvictionPolicy::Lfu) {
            return;
        }
        inner.activity += 1;
        if inner.activity % LFU_DECAY_EVERY != 0 {
            return;
        }
        for entry in inner.map.values_mut() {
            entry.frequency /= 2;
        }
        debug!("[local tier] decayed LFU frequencies");
    }

    fn enforce_bound(&self, inner: &mut Inner) {
        match self.policy {
            EvictionPolicy::Weight => {
                while inner.total_weight > self.max_weight_bytes && !inner.map.is_empty() {
                    let Some(victim) = self.find_victim(inner) else {
                        break;
                    };
                    if let Some(entry) = inner.map.remove(&victim) {
                        inner.total_weight = inner.total_weight.saturating_sub(entry.weight());
                    }
                    if let Some(pos) = inner.order.iter().position(|k| *k == victim) {
                        inner.order.remove(pos);
                    }
                    debug!(key = %victim, "[local tier] evicted entry (weight bound)");
                }
            }
            _ => {
                while inner.map.len() as u64 > self.max_entries && !inner.map.is_empty() {
                    let Some(victim) = self.find_victim(inner) else {
                        break;
                    };
                    if let Some(entry) = inner.map.remove(&victim) {
                        inner.total_weight = inner.total_weight.saturating_sub(entry.weight());
                    }
                    if let Some(pos) = inner.order.iter().position(|k| *k == victim) {
                        inner.order.remove(pos);
                    }
                    debug!(key = %victim, "[local tier] evicted entry (entry-count bound)");
                }
            }
        }
    }
}

impl LocalBackend for LocalTier {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        self.tick_lfu_decay(&mut inner);
        let expired = inner.map.get(key).is_some_and(Entry::is_expired);
        if expired {
            if let Some(entry) = inner.map.remove(key) {
                inner.total_weight = inner.total_weight.saturating_sub(entry.weight());
            }
            if let Some(pos) = inner.order.iter().position(|k| k == key) {
                inner.order.remove(pos);
            }
            return None;
        }

        let value = inner.map.get(key).map(|entry| entry.value.clone());
        if value.is_some() {
            if matches!(self.policy, EvictionPolicy::Lru) {
                Self::touch_order(&mut inner.order, key);
            }
            if let Some(entry) = inner.map.get_mut(key) {
                entry.frequency += 1;
            }
        }
        value
    }

    fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut inner = self.inner.lock();
        self.tick_lfu_decay(&mut inner);
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
            frequency: 1,
        };
        if let Some(old) = inner.map.insert(key.to_string(), entry) {
            inner.total_weight = inner.total_weight.saturating_sub(old.weight());
        }
        if let Some(entry) = inner.map.get(key) {
            inner.total_weight += entry.weight();
        }
        Self::touch_order(&mut inner.order, key);
        self.enforce_bound(&mut inner);
    }

    fn evict(&self, key: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.map.remove(key) {
            inner.total_weight = inner.total_weight.saturating_sub(entry.weight());
        }
        if let Some(pos) = inner.order.iter().position(|k| k == key) {
            inner.order.remove(pos);
        }
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
        inner.total_weight = 0;
    }

    fn len(&self) -> usize {
        self.inner.lock().map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_retrieves_a_value() {
        let tier = LocalTier::new(EvictionPolicy::Lru, 10, 1024);
        tier.put("a", b"hello".to_vec(), Duration::from_secs(60));
        assert_eq!(tier.get("a"), Some(b"hello".to_vec()));
    }

    #[test]
    fn expired_entries_are_absent_from_get() {
        let tier = LocalTier::new(EvictionPolicy::Lru, 10, 1024);
        tier.put("a", b"hello".to_vec(), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(tier.get("a"), None);
    }

    #[test]
    fn fifo_evicts_oldest_insertion_regardless_of_access() {
        let tier = LocalTier::new(EvictionPolicy::Fifo, 2, 1024);
        tier.put("a", b"1".to_vec(), Duration::from_secs(60));
        tier.put("b", b"2".to_vec(), Duration::from_secs(60));
        // Access "a" repeatedly; FIFO must still evict it first.
        let _ = tier.get("a");
        let _ = tier.get("a");
        tier.put("c", b"3".to_vec(), Duration::from_secs(60));
        assert_eq!(tier.get("a"), None);
        assert!(tier.get("b").is_some());
        assert!(tier.get("c").is_some());
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let tier = LocalTier::new(EvictionPolicy::Lru, 2, 1024);
        tier.put("a", b"1".to_vec(), Duration::from_secs(60));
        tier.put("b", b"2".to_vec(), Duration::from_secs(60));
        // Touch "a" so "b" becomes the least-recently-used.
        let _ = tier.get("a");
        tier.put("c", b"3".to_vec(), Duration::from_secs(60));
        assert_eq!(tier.get("b"), None);
        assert!(tier.get("a").is_some());
        assert!(tier.get("c").is_some());
    }

    #[test]
    fn weight_policy_bounds_by_total_bytes() {
        let tier = LocalTier::new(EvictionPolicy::Weight, u64::MAX, 10);
        tier.put("a", vec![0u8; 6], Duration::from_secs(60));
        tier.put("b", vec![0u8; 6], Duration::from_secs(60));
        // Total weight (12) exceeds the 10-byte bound; one entry is evicted.
        assert!(tier.len() <= 1);
    }

    #[test]
    fn lfu_ages_out_stale_popularity() {
        let tier = LocalTier::new(EvictionPolicy::Lfu, 2, 1024);

        tier.put("hot_long_ago", b"1".to_vec(), Duration::from_secs(60));
        // Build up a large historical frequency, then go cold.
        for _ in 0..200 {
            let _ = tier.get("hot_long_ago");
        }

        tier.put("b", b"2".to_vec(), Duration::from_secs(60));
        // "hot_long_ago" sits idle through enough activity ticks to decay
        // all the way to zero, while "b" keeps earning fresh frequency.
        for _ in 0..700 {
            let _ = tier.get("b");
        }

        // Without aging "hot_long_ago"'s stale popularity would keep it
        // permanently safe and this insert would evict something else.
        tier.put("c", b"3".to_vec(), Duration::from_secs(60));
        assert!(
            tier.get("hot_long_ago").is_none(),
            "a cold, long-ago-popular key must eventually be evicted"
        );
        assert!(tier.get("b").is_some(), "recently active key must survive");
        assert!(tier.get("c").is_some());
    }

    #[test]
    fn clear_removes_everything() {
        let tier = LocalTier::new(EvictionPolicy::Lru, 10, 1024);
        tier.put("a", b"1".to_vec(), Duration::from_secs(60));
        tier.clear();
        assert!(tier.is_empty());
    }
}
