//! Shared test infrastructure for the integration suite.
//!
//! Deliberately Redis-free: `FakeRemoteTier` is an in-memory stand-in for
//! the remote tier (C3) so these tests are deterministic and don't depend
//! on a live external store, grounded on the same map+TTL shape as
//! `src/backends/local.rs`'s entry struct.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiered_cache_engine::RemoteBackend;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory `RemoteBackend` used by the integration suite in place of a
/// live Redis instance. Supports simulating an outage via [`Self::kill`]
/// and recovery via [`Self::revive`], matching scenario S6.
pub struct FakeRemoteTier {
    store: DashMap<String, Entry>,
    available: AtomicBool,
    lease: DashMap<String, Instant>,
}

impl FakeRemoteTier {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: DashMap::new(),
            available: AtomicBool::new(true),
            lease: DashMap::new(),
        })
    }

    /// Simulates a remote-tier outage: every operation becomes a no-op/miss
    /// until [`Self::revive`] or a successful `ping` restores availability.
    pub fn kill(&self) {
        self.available.store(false, Ordering::SeqCst);
    }

    pub fn revive(&self) {
        self.available.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }
}

#[async_trait]
impl RemoteBackend for FakeRemoteTier {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }
        let entry = self.store.get(key)?;
        if Instant::now() >= entry.expires_at {
            drop(entry);
            self.store.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> anyhow::Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.store.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn evict(&self, key: &str) -> anyhow::Result<()> {
        self.store.remove(key);
        Ok(())
    }

    async fn multi_get_pipelined(&self, keys: &[String]) -> HashMap<String, Vec<u8>> {
        if !self.available.load(Ordering::SeqCst) {
            return HashMap::new();
        }
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(bytes) = RemoteBackend::get(self, key).await {
                out.insert(key.clone(), bytes);
            }
        }
        out
    }

    async fn multi_put_pipelined(&self, entries: &[(String, Vec<u8>)], ttl: Duration) {
        for (key, value) in entries {
            let _ = RemoteBackend::put(self, key, value, ttl).await;
        }
    }

    async fn try_acquire_lease(&self, key: &str, ttl: Duration) -> bool {
        if !self.available.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        let mut acquired = false;
        self.lease
            .entry(key.to_string())
            .and_modify(|expires_at| {
                if now >= *expires_at {
                    *expires_at = now + ttl;
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                now + ttl
            });
        acquired
    }

    async fn release_lease(&self, key: &str) {
        self.lease.remove(key);
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn ping(&self) -> bool {
        // A fake store is reachable as soon as it's revived; a real probe
        // would attempt a round-trip here.
        self.available.load(Ordering::SeqCst)
    }
}

/// Test domain type used across the suite.
pub mod test_data {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct User {
        pub id: u64,
        pub name: String,
        pub email: String,
    }

    impl User {
        #[must_use]
        pub fn new(id: u64) -> Self {
            Self {
                id,
                name: format!("User {id}"),
                email: format!("user{id}@example.com"),
            }
        }
    }
}

/// Busy-waits for `condition` up to `timeout_ms`, polling every 10ms.
pub async fn wait_for<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    use tokio::time::sleep;

    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_remote_round_trips() {
        let remote = FakeRemoteTier::new();
        remote.put("k", b"v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(remote.get("k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn kill_and_revive_toggles_availability() {
        let remote = FakeRemoteTier::new();
        remote.put("k", b"v", Duration::from_secs(60)).await.unwrap();
        remote.kill();
        assert!(!remote.is_available());
        assert_eq!(remote.get("k").await, None);
        remote.revive();
        assert!(remote.ping().await);
        assert_eq!(remote.get("k").await, Some(b"v".to_vec()));
    }
}
