//! Tiered Cache Engine
//!
//! A descriptor-driven, two-tier (local + remote) read-through cache
//! engine, built for annotation/AOP-style method memoization:
//!
//! - **Tier coordinator (C4)**: composes a bounded in-process local tier
//!   (C2) with an optional remote key-value tier (C3), promoting remote
//!   hits into the local tier and degrading gracefully when no remote
//!   store is configured.
//! - **Hot-key single-flight (C6)**: a remote lease elects one regenerator
//!   per key under concurrent misses; losing callers poll for the result.
//! - **Batch pipeline (C7)**: fans a collection of identifiers through a
//!   single pipelined remote round-trip, regenerating only the misses via
//!   a user-supplied bulk loader, preserving input order.
//! - **Negative-lookup filter (C5)**: a per-namespace Bloom filter that
//!   short-circuits lookups for identifiers never observed as present.
//!
//! The engine itself never decides *what* to cache or *how* to parse key
//! expressions — it is driven entirely by [`CacheDescriptor`]/
//! [`BatchDescriptor`] values and an injected [`Evaluator`], produced by an
//! external interception layer (SPEC_FULL.md §6). This crate does not ship
//! that layer; it is the reusable engine core underneath one.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tiered_cache_engine::{CacheEngine, CacheDescriptor, DescriptorHeader, LayerMask};
//! use tiered_cache_engine::expr::CallArgs;
//! use std::time::Duration;
//!
//! #[derive(serde::Serialize, serde::Deserialize, Clone)]
//! struct User { id: u64, name: String }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // No remote tier configured: falls back to local-only, degraded gracefully.
//!     let engine = CacheEngine::local_only(Default::default());
//!
//!     let descriptor = CacheDescriptor {
//!         header: DescriptorHeader {
//!             logical_names: vec!["user".to_string()],
//!             layer_mask: LayerMask::LOCAL_ONLY,
//!             ..DescriptorHeader::default()
//!         },
//!         key_expr: "#id".to_string(),
//!         condition_expr: None,
//!         ttl_remote: Duration::from_secs(60),
//!         ttl_local: Duration::from_secs(60),
//!         ttl_expr: None,
//!         ttl_field: None,
//!         cache_nulls: true,
//!         hot_key: false,
//!     };
//!
//!     let mut args = CallArgs::new();
//!     args.insert("id", 1);
//!
//!     let user = engine
//!         .single()
//!         .lookup(&descriptor, &args, || async {
//!             Ok(Some(User { id: 1, name: "Alice".to_string() }))
//!         })
//!         .await?;
//!
//!     println!("{:?}", user.map(|u| u.name));
//!     Ok(())
//! }
//! ```

pub mod backends;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod expr;
pub mod filter;
pub mod resolver;

#[cfg(feature = "redis")]
pub use backends::RedisRemoteTier;
pub use backends::{LocalBackend, NullRemoteTier, RemoteBackend};
pub use codec::{CacheCodec, JsonCodec, PostcardCodec};
pub use config::EngineConfig;
pub use coordinator::TierCoordinator;
pub use descriptor::{BatchDescriptor, CacheDescriptor, DescriptorHeader, EvictionPolicy, LayerMask};
pub use engine::{BatchEngine, SingleLookupEngine};
pub use error::{CacheError, CacheResult};
pub use expr::{CallArgs, Evaluator, TemplateEvaluator};
pub use filter::NegativeLookupFilter;
pub use resolver::{CallSite, DescriptorResolver};

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Interval between automatic remote-tier health probes (§4.3, §5: "the
/// remote-tier health probe is a single background task").
const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Top-level facade wiring C1 (codec), C4 (tier coordinator), C5 (negative
/// lookup filter), C6 (single-lookup engine), C7 (batch engine), and C8
/// (descriptor resolvers) into one value, generic over the codec in use.
///
/// There is no global cache instance (SPEC_FULL.md §5): a `CacheEngine` is
/// a value carrying collaborator references and is expected to be
/// constructed once per process and shared (behind an `Arc`, typically) by
/// the embedding interception layer.
pub struct CacheEngine<C: CacheCodec = PostcardCodec> {
    config: EngineConfig,
    coordinator: Arc<TierCoordinator>,
    filter: Arc<NegativeLookupFilter>,
    evaluator: Arc<dyn Evaluator>,
    single: SingleLookupEngine<C>,
    batch: BatchEngine<C>,
    single_descriptors: DescriptorResolver<CacheDescriptor>,
    batch_descriptors: DescriptorResolver<BatchDescriptor>,
    health_probe: Option<tokio::task::JoinHandle<()>>,
}

impl CacheEngine<PostcardCodec> {
    /// Construct an engine with no remote tier: every descriptor behaves
    /// as if `layer_mask` excluded `REMOTE`, `hot_key` always takes the
    /// in-process coalescing fallback, and batch calls observe zero cache
    /// hits (the remote tier is the only one batch consults).
    #[must_use]
    pub fn local_only(config: EngineConfig) -> Self {
        Self::new(Arc::new(NullRemoteTier), Arc::new(TemplateEvaluator::new()), config)
    }

    /// Construct a Postcard-codec engine backed by `remote`, using
    /// [`TemplateEvaluator`] as the reference expression evaluator. A
    /// concrete, non-generic convenience over [`CacheEngine::new`] so
    /// callers who don't care about the codec type don't need a turbofish.
    #[must_use]
    pub fn with_remote(remote: Arc<dyn RemoteBackend>, config: EngineConfig) -> Self {
        Self::new(remote, Arc::new(TemplateEvaluator::new()), config)
    }
}

impl<C: CacheCodec + Default> CacheEngine<C> {
    /// Construct an engine backed by `remote` (pass [`NullRemoteTier`] to
    /// run local-only) with `evaluator` driving key/condition/TTL
    /// expressions, and `codec` defaulted via `C::default()`.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteBackend>, evaluator: Arc<dyn Evaluator>, config: EngineConfig) -> Self {
        Self::with_codec(remote, evaluator, Arc::new(C::default()), config)
    }
}

impl<C: CacheCodec> CacheEngine<C> {
    /// Construct an engine with an explicit codec instance.
    #[must_use]
    pub fn with_codec(
        remote: Arc<dyn RemoteBackend>,
        evaluator: Arc<dyn Evaluator>,
        codec: Arc<C>,
        config: EngineConfig,
    ) -> Self {
        let coordinator = Arc::new(TierCoordinator::new(remote.clone()));
        let filter = Arc::new(NegativeLookupFilter::new(
            config.bloom.expected_insertions,
            config.bloom.false_positive_rate,
        ));
        let default_remote_ttl = std::time::Duration::from_secs(config.default_expire_seconds);

        let single = SingleLookupEngine::new(
            coordinator.clone(),
            filter.clone(),
            codec.clone(),
            evaluator.clone(),
            config.hot_key,
            default_remote_ttl,
        );
        let probe_remote = remote.clone();
        let batch = BatchEngine::new(remote, codec, evaluator.clone(), default_remote_ttl);

        // Only spawn when a runtime is already driving us; constructing a
        // `CacheEngine` outside of one (synchronous tests, benchmark setup
        // before `block_on`) is still valid, it just runs without an
        // automatic probe until the caller enters a runtime.
        let health_probe = tokio::runtime::Handle::try_current().ok().map(|handle| {
            handle.spawn(async move {
                let mut ticker = tokio::time::interval(HEALTH_PROBE_INTERVAL);
                ticker.tick().await; // first tick fires immediately; skip it, ping() already ran at connect time
                loop {
                    ticker.tick().await;
                    probe_remote.ping().await;
                }
            })
        });
        if health_probe.is_none() {
            debug!("no active Tokio runtime at construction time, remote health probe not spawned");
        }

        Self {
            config,
            coordinator,
            filter,
            evaluator,
            single,
            batch,
            single_descriptors: DescriptorResolver::new(),
            batch_descriptors: DescriptorResolver::new(),
            health_probe,
        }
    }

    /// The single-lookup engine (C6).
    #[must_use]
    pub fn single(&self) -> &SingleLookupEngine<C> {
        &self.single
    }

    /// The batch engine (C7).
    #[must_use]
    pub fn batch(&self) -> &BatchEngine<C> {
        &self.batch
    }

    /// The tier coordinator (C4), exposed for health checks and direct
    /// eviction (e.g. from an externally-injected invalidation hook).
    #[must_use]
    pub fn coordinator(&self) -> &Arc<TierCoordinator> {
        &self.coordinator
    }

    /// The negative-lookup filter (C5).
    #[must_use]
    pub fn filter(&self) -> &Arc<NegativeLookupFilter> {
        &self.filter
    }

    #[must_use]
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Descriptor & parameter-name resolver for single-lookup call sites
    /// (C8). Discovery happens once per [`CallSite`]; subsequent
    /// resolutions are lock-free map reads.
    #[must_use]
    pub fn resolve_single_descriptor(
        &self,
        site: &CallSite,
        parse: impl FnOnce() -> CacheDescriptor,
    ) -> Arc<CacheDescriptor> {
        self.single_descriptors.resolve_with(site, parse)
    }

    /// Descriptor & parameter-name resolver for batch call sites (C8).
    #[must_use]
    pub fn resolve_batch_descriptor(
        &self,
        site: &CallSite,
        parse: impl FnOnce() -> BatchDescriptor,
    ) -> Arc<BatchDescriptor> {
        self.batch_descriptors.resolve_with(site, parse)
    }

    /// True if the remote tier reports itself available right now
    /// (SPEC_FULL.md §4.3's health-tracked flag, not a fresh probe).
    #[must_use]
    pub fn remote_available(&self) -> bool {
        self.coordinator.remote().is_available()
    }

    /// Actively probes the remote tier's connectivity, restoring
    /// `remote_available()` to true on success (§4.3, scenario S6).
    pub async fn ping_remote(&self) -> bool {
        self.coordinator.remote().ping().await
    }

    /// Probes liveness of both tiers. The local tier is in-process memory
    /// and is always reported live; the remote tier is actively pinged.
    pub async fn health_check(&self) -> EngineHealth {
        EngineHealth {
            local_available: true,
            remote_available: self.ping_remote().await,
        }
    }
}

impl<C: CacheCodec> Drop for CacheEngine<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.health_probe.take() {
            handle.abort();
        }
    }
}

/// Snapshot of tier liveness returned by [`CacheEngine::health_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineHealth {
    pub local_available: bool,
    pub remote_available: bool,
}
