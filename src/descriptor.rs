//! Cache descriptors — the immutable per-operation policy record that
//! drives both the single-lookup and batch engines.

use std::time::Duration;

/// Which tiers participate in a cached operation's reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerMask {
    pub local: bool,
    pub remote: bool,
}

impl LayerMask {
    pub const LOCAL_ONLY: Self = Self {
        local: true,
        remote: false,
    };
    pub const REMOTE_ONLY: Self = Self {
        local: false,
        remote: true,
    };
    pub const BOTH: Self = Self {
        local: true,
        remote: true,
    };

    #[must_use]
    pub fn is_two_tier(self) -> bool {
        self.local && self.remote
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::BOTH
    }
}

/// Eviction order applied by the local tier once it reaches its bound.
///
/// | Policy | Bound | Eviction order |
/// |---|---|---|
/// | LRU | `max_entries` | least-recently-used first |
/// | LFU | `max_entries` | least-frequently-used (with aging) |
/// | FIFO | `max_entries` | insertion order |
/// | WEIGHT | `max_weight_bytes` | lowest-weight first, weight = `len(bytes)` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    #[default]
    Lru,
    Lfu,
    Fifo,
    Weight,
}

/// Fields shared by single-operation and batch descriptors.
#[derive(Debug, Clone)]
pub struct DescriptorHeader {
    /// Non-empty ordered list of namespaces; `logical_names[0]` is active.
    pub logical_names: Vec<String>,
    pub layer_mask: LayerMask,
    pub compress: bool,
    pub compress_threshold: usize,
    pub eviction_policy: EvictionPolicy,
    pub max_entries: u64,
    pub max_weight_bytes: u64,
    pub max_key_bytes: usize,
    pub reject_oversize_key: bool,
}

impl DescriptorHeader {
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.logical_names.first().map_or("", String::as_str)
    }
}

impl Default for DescriptorHeader {
    fn default() -> Self {
        Self {
            logical_names: vec!["default".to_string()],
            layer_mask: LayerMask::default(),
            compress: false,
            compress_threshold: 4096,
            eviction_policy: EvictionPolicy::default(),
            max_entries: 10_000,
            max_weight_bytes: 16 * 1024 * 1024,
            max_key_bytes: 512,
            reject_oversize_key: false,
        }
    }
}

/// Immutable per-operation caching policy for a single (non-batch) lookup.
#[derive(Debug, Clone)]
pub struct CacheDescriptor {
    pub header: DescriptorHeader,
    /// Expression producing the per-call key suffix from call arguments.
    pub key_expr: String,
    /// Optional boolean gate; when it evaluates false the call bypasses the cache.
    pub condition_expr: Option<String>,
    pub ttl_remote: Duration,
    pub ttl_local: Duration,
    /// Dynamic TTL evaluated against call arguments; wins over `ttl_remote` when positive.
    pub ttl_expr: Option<String>,
    /// Result-field name holding an absolute epoch-seconds expiry.
    pub ttl_field: Option<String>,
    /// When true, a null result is memoized under the null marker; when
    /// false, nulls are never memoized and the negative-lookup filter gates reads.
    pub cache_nulls: bool,
    /// Enables the hot-key single-flight protocol on misses.
    pub hot_key: bool,
}

impl CacheDescriptor {
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.header.namespace()
    }
}

/// Immutable per-operation caching policy for a batch lookup over a
/// collection of domain identifiers.
#[derive(Debug, Clone)]
pub struct BatchDescriptor {
    pub header: DescriptorHeader,
    /// Expression referencing the single collection/array pivot argument.
    /// Re-evaluated once per element with the pivot rebound (§4.7 step 2).
    pub item_key_expr: String,
    /// Parameter name of the pivot argument `item_key_expr` references.
    /// Determined once at discovery time by the binding layer that parses
    /// the expression (the engine itself treats expressions as opaque
    /// strings per SPEC_FULL.md §6).
    pub pivot_param: String,
    /// Name of the field on each bulk-loader result item carrying its
    /// identifier, used to build the `id -> item` merge map (§4.7 step 5).
    pub id_field: String,
    pub ttl_remote: Duration,
}

impl BatchDescriptor {
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.header.namespace()
    }
}
