//! Trait abstractions for the two tiers composed by the coordinator (C4).

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// In-process bounded key→bytes store (C2). Synchronous: all operations are
/// plain memory access guarded by an internal lock, never I/O.
pub trait LocalBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn put(&self, key: &str, value: Vec<u8>, ttl: Duration);
    fn evict(&self, key: &str);
    fn clear(&self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Optional external key→bytes store (C3), health-tracked with pipelined
/// batch I/O and single-shot lease acquisition for the hot-key protocol.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
    async fn evict(&self, key: &str) -> Result<()>;

    /// Single round-trip multi-get. Keys absent from the store are absent
    /// from the returned map. On transport failure, implementations fall
    /// back to per-key `get` so partial progress is retained.
    async fn multi_get_pipelined(&self, keys: &[String]) -> HashMap<String, Vec<u8>>;

    /// Single round-trip multi-put, one TTL applied to every entry. On
    /// transport failure, implementations fall back to per-key `put`.
    async fn multi_put_pipelined(&self, entries: &[(String, Vec<u8>)], ttl: Duration);

    /// Single-shot compare-and-set: writes a sentinel at `key` with `ttl`
    /// iff absent. Returns true iff the caller now holds the lease.
    async fn try_acquire_lease(&self, key: &str, ttl: Duration) -> bool;

    /// Deletes the lease sentinel. Must only be called by the holder.
    async fn release_lease(&self, key: &str);

    /// Fast flag maintained by a background health probe and failure-path
    /// transitions; does not itself perform I/O.
    fn is_available(&self) -> bool;

    /// Active connectivity probe; on success flips `is_available()` to true.
    async fn ping(&self) -> bool;
}
