//! Benchmarks for the tier coordinator (C4): two-tier promotion and
//! layer-mask overhead.

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tiered_cache_engine::expr::CallArgs;
use tiered_cache_engine::{CacheDescriptor, CacheEngine, DescriptorHeader, EngineConfig, LayerMask, RemoteBackend};
use tokio::runtime::Runtime;

/// Minimal in-memory remote tier, sized for benchmarking rather than
/// correctness testing (no TTL expiry — see `tests/common` for that).
struct BenchRemote {
    store: DashMap<String, Vec<u8>>,
}

#[async_trait]
impl RemoteBackend for BenchRemote {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.store.get(key).map(|v| v.clone())
    }
    async fn put(&self, key: &str, value: &[u8], _ttl: Duration) -> anyhow::Result<()> {
        self.store.insert(key.to_string(), value.to_vec());
        Ok(())
    }
    async fn evict(&self, key: &str) -> anyhow::Result<()> {
        self.store.remove(key);
        Ok(())
    }
    async fn multi_get_pipelined(&self, keys: &[String]) -> HashMap<String, Vec<u8>> {
        keys.iter().filter_map(|k| self.store.get(k).map(|v| (k.clone(), v.clone()))).collect()
    }
    async fn multi_put_pipelined(&self, entries: &[(String, Vec<u8>)], _ttl: Duration) {
        for (k, v) in entries {
            self.store.insert(k.clone(), v.clone());
        }
    }
    async fn try_acquire_lease(&self, _key: &str, _ttl: Duration) -> bool {
        true
    }
    async fn release_lease(&self, _key: &str) {}
    fn is_available(&self) -> bool {
        true
    }
    async fn ping(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Payload {
    data: String,
}

fn descriptor(mask: LayerMask) -> CacheDescriptor {
    CacheDescriptor {
        header: DescriptorHeader {
            logical_names: vec!["bench".to_string()],
            layer_mask: mask,
            max_entries: 100_000,
            ..DescriptorHeader::default()
        },
        key_expr: "#id".to_string(),
        condition_expr: None,
        ttl_remote: Duration::from_secs(60),
        ttl_local: Duration::from_secs(60),
        ttl_expr: None,
        ttl_field: None,
        cache_nulls: true,
        hot_key: false,
    }
}

fn bench_two_tier_promotion(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let remote = Arc::new(BenchRemote { store: DashMap::new() });
    let engine = CacheEngine::with_remote(remote, EngineConfig::default());
    let descriptor = descriptor(LayerMask::BOTH);

    let mut group = c.benchmark_group("two_tier_remote_hit_promotion");
    for size in &[128usize, 4096] {
        let value = Payload { data: "x".repeat(*size) };
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            let counter = std::sync::atomic::AtomicU64::new(0);
            b.iter(|| {
                rt.block_on(async {
                    let id = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    let mut args = CallArgs::new();
                    args.insert("id", json!(id));
                    // First call regenerates and writes both tiers; the
                    // benchmark measures the steady-state promotion path
                    // for a fresh key each iteration to avoid an all-local
                    // cache that never touches the remote tier.
                    let value: Option<Payload> = engine
                        .single()
                        .lookup(&descriptor, &args, || {
                            let value = value.clone();
                            async move { Ok(Some(value)) }
                        })
                        .await
                        .unwrap();
                    black_box(value);
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_two_tier_promotion);
criterion_main!(benches);
