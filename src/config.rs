//! Engine configuration value.
//!
//! The process-level loader that turns a config file or environment into
//! this struct lives outside the engine. `EngineConfig` is the concrete,
//! already-parsed value the engine consumes; every field mirrors one row of
//! the configuration surface table.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration, deserializable from whatever format the
/// embedding application prefers (TOML, env, etc.) via `serde`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fallback remote TTL, in seconds, used when a descriptor's own
    /// `ttl_remote` and all dynamic TTL resolvers are absent.
    pub default_expire_seconds: u64,
    /// Fallback local TTL, in seconds.
    pub default_local_expire_seconds: u64,
    /// Sizing hint for an externally-injected preload/refresh scheduler.
    /// Not read internally; see SPEC_FULL.md §9 open question 3.
    pub scheduler_pool_size: usize,
    pub bloom: BloomConfig,
    pub hot_key: HotKeyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_expire_seconds: 3600,
            default_local_expire_seconds: 600,
            scheduler_pool_size: 5,
            bloom: BloomConfig::default(),
            hot_key: HotKeyConfig::default(),
        }
    }
}

/// Negative-lookup filter sizing, one instance per logical namespace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    pub expected_insertions: usize,
    pub false_positive_rate: f64,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            expected_insertions: 1_000_000,
            false_positive_rate: 0.01,
        }
    }
}

/// Hot-key single-flight poll budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HotKeyConfig {
    pub retry_count: u32,
    pub retry_interval_ms: u64,
    pub lock_timeout_seconds: u64,
}

impl Default for HotKeyConfig {
    fn default() -> Self {
        Self {
            retry_count: 10,
            retry_interval_ms: 50,
            lock_timeout_seconds: 5,
        }
    }
}

impl HotKeyConfig {
    pub fn retry_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_interval_ms)
    }

    pub fn lease_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lock_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configuration_surface_table() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.default_expire_seconds, 3600);
        assert_eq!(cfg.default_local_expire_seconds, 600);
        assert_eq!(cfg.scheduler_pool_size, 5);
        assert_eq!(cfg.bloom.expected_insertions, 1_000_000);
        assert!((cfg.bloom.false_positive_rate - 0.01).abs() < f64::EPSILON);
        assert_eq!(cfg.hot_key.retry_count, 10);
        assert_eq!(cfg.hot_key.retry_interval_ms, 50);
        assert_eq!(cfg.hot_key.lock_timeout_seconds, 5);
    }

    #[test]
    fn partial_deserialization_fills_in_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"default_expire_seconds": 120}"#)
            .expect("partial config should deserialize");
        assert_eq!(cfg.default_expire_seconds, 120);
        assert_eq!(cfg.default_local_expire_seconds, 600);
    }
}
