//! Tier coordinator (C4) — composes the local and remote tiers per
//! descriptor, applying the layer mask and promoting remote hits into the
//! local tier.
//!
//! Iterates tiers in order and promotes a hit into every higher tier,
//! narrowed to a fixed {LOCAL, REMOTE} pair with one local tier memoized
//! per logical namespace.

use crate::backends::{LocalTier, RemoteBackend};
use crate::descriptor::DescriptorHeader;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Composes C2 (local tiers, one per namespace) and C3 (a single shared
/// remote tier) according to each descriptor's layer mask.
pub struct TierCoordinator {
    remote: Arc<dyn RemoteBackend>,
    local_tiers: DashMap<String, Arc<LocalTier>>,
}

impl TierCoordinator {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteBackend>) -> Self {
        Self {
            remote,
            local_tiers: DashMap::new(),
        }
    }

    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteBackend> {
        &self.remote
    }

    /// Returns this namespace's local tier, constructing it on first
    /// reference. A single descriptor's namespace creates at most one
    /// instance — the `DashMap::entry` insert-once pattern gives that for
    /// free.
    fn local_tier_for(&self, header: &DescriptorHeader) -> Arc<LocalTier> {
        self.local_tiers
            .entry(header.namespace().to_string())
            .or_insert_with(|| {
                Arc::new(LocalTier::new(
                    header.eviction_policy,
                    header.max_entries,
                    header.max_weight_bytes,
                ))
            })
            .clone()
    }

    /// §4.4 `get`: local first, then remote with promotion.
    pub async fn get(
        &self,
        key: &str,
        header: &DescriptorHeader,
        local_ttl: Duration,
    ) -> Option<Vec<u8>> {
        if header.layer_mask.local {
            let local = self.local_tier_for(header);
            if let Some(bytes) = local.get(key) {
                return Some(bytes);
            }
        }

        if header.layer_mask.remote {
            if let Some(bytes) = self.remote.get(key).await {
                if header.layer_mask.local {
                    debug!(key = %key, "promoting remote hit into local tier");
                    self.local_tier_for(header).put(key, bytes.clone(), local_ttl);
                }
                return Some(bytes);
            }
        }

        None
    }

    /// §4.4 `put`: write to each enabled tier, local first.
    pub async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        header: &DescriptorHeader,
        local_ttl: Duration,
        remote_ttl: Duration,
    ) {
        if header.layer_mask.local {
            self.local_tier_for(header).put(key, bytes.to_vec(), local_ttl);
        }
        if header.layer_mask.remote {
            let _ = self.remote.put(key, bytes, remote_ttl).await;
        }
    }

    /// §4.4 `evict`: evict from each enabled tier.
    pub async fn evict(&self, key: &str, header: &DescriptorHeader) {
        if header.layer_mask.local {
            self.local_tier_for(header).evict(key);
        }
        if header.layer_mask.remote {
            let _ = self.remote.evict(key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::NullRemoteTier;
    use crate::descriptor::{EvictionPolicy, LayerMask};

    fn header(mask: LayerMask) -> DescriptorHeader {
        DescriptorHeader {
            logical_names: vec!["user".to_string()],
            layer_mask: mask,
            compress: false,
            compress_threshold: 4096,
            eviction_policy: EvictionPolicy::Lru,
            max_entries: 100,
            max_weight_bytes: 1024 * 1024,
            max_key_bytes: 512,
            reject_oversize_key: false,
        }
    }

    #[tokio::test]
    async fn local_only_round_trip() {
        let coordinator = TierCoordinator::new(Arc::new(NullRemoteTier));
        let header = header(LayerMask::LOCAL_ONLY);
        coordinator
            .put("user::1", b"alice", &header, Duration::from_secs(60), Duration::from_secs(60))
            .await;
        let got = coordinator.get("user::1", &header, Duration::from_secs(60)).await;
        assert_eq!(got, Some(b"alice".to_vec()));
    }

    #[tokio::test]
    async fn two_tier_memoizes_one_local_tier_per_namespace() {
        let coordinator = TierCoordinator::new(Arc::new(NullRemoteTier));
        let header = header(LayerMask::BOTH);
        let first = coordinator.local_tier_for(&header);
        let second = coordinator.local_tier_for(&header);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
