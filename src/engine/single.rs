//! Single-lookup engine (C6) — descriptor-driven read-through for one
//! call: condition gate, key build, the negative-lookup shield,
//! read-through via the tier coordinator, and hot-key single-flight
//! regeneration on miss.
//!
//! The primary single-flight path is the remote lease (§4.6). The
//! in-process fallback mutex used when the remote tier is unavailable is
//! grounded on the teacher's `get_or_compute` double-checked-locking
//! pattern in `src/cache_manager.rs` (`DashMap<String, Arc<Mutex<()>>>`
//! plus an RAII guard that removes the map entry once the last waiter is
//! gone).

use crate::codec::{decode_payload, encode_payload, CacheCodec, NULL_MARKER};
use crate::config::HotKeyConfig;
use crate::coordinator::TierCoordinator;
use crate::descriptor::CacheDescriptor;
use crate::error::{CacheError, CacheResult};
use crate::expr::{CallArgs, Evaluator};
use crate::filter::NegativeLookupFilter;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use tracing::{debug, warn};

const NULL_TTL: Duration = Duration::from_secs(60);

/// Releases a hot-key lease exactly once, even if the holder's call path
/// errors or panics before reaching the normal release point.
struct LeaseGuard {
    remote: Arc<dyn crate::backends::RemoteBackend>,
    key: String,
    released: AtomicBool,
}

impl LeaseGuard {
    fn new(remote: Arc<dyn crate::backends::RemoteBackend>, key: String) -> Self {
        Self {
            remote,
            key,
            released: AtomicBool::new(false),
        }
    }

    async fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.remote.release_lease(&self.key).await;
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !self.released.load(Ordering::SeqCst) {
            let remote = self.remote.clone();
            let key = self.key.clone();
            tokio::spawn(async move {
                remote.release_lease(&key).await;
            });
        }
    }
}

pub struct SingleLookupEngine<C: CacheCodec> {
    coordinator: Arc<TierCoordinator>,
    filter: Arc<NegativeLookupFilter>,
    codec: Arc<C>,
    evaluator: Arc<dyn Evaluator>,
    hot_key: HotKeyConfig,
    default_remote_ttl: Duration,
    /// Per-key coalescing mutex used only as the in-process fallback when
    /// `hot_key=true` and the remote tier is unavailable (§4.6a, open
    /// question 2).
    in_flight: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl<C: CacheCodec> SingleLookupEngine<C> {
    #[must_use]
    pub fn new(
        coordinator: Arc<TierCoordinator>,
        filter: Arc<NegativeLookupFilter>,
        codec: Arc<C>,
        evaluator: Arc<dyn Evaluator>,
        hot_key: HotKeyConfig,
        default_remote_ttl: Duration,
    ) -> Self {
        Self {
            coordinator,
            filter,
            codec,
            evaluator,
            hot_key,
            default_remote_ttl,
            in_flight: DashMap::new(),
        }
    }

    /// Public contract of C6: given a descriptor, call arguments, and a
    /// deferred loader, return the cached or freshly-loaded value.
    pub async fn lookup<T, F, Fut>(
        &self,
        descriptor: &CacheDescriptor,
        args: &CallArgs,
        loader: F,
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        // 1. Condition gate.
        if let Some(cond) = &descriptor.condition_expr {
            let passes = self
                .evaluator
                .eval_bool(cond, args)
                .map_err(|source| CacheError::ExpressionFailed {
                    expr: cond.clone(),
                    source,
                })?;
            if !passes {
                return loader().await.map_err(CacheError::LoaderFailed);
            }
        }

        // 2. Key build.
        let suffix = self
            .evaluator
            .eval_string(&descriptor.key_expr, args)
            .map_err(|source| CacheError::ExpressionFailed {
                expr: descriptor.key_expr.clone(),
                source,
            })?;
        let namespace = descriptor.namespace();
        let key = format!("{namespace}::{suffix}");

        // 3. Key-size gate.
        if key.len() > descriptor.header.max_key_bytes {
            if descriptor.header.reject_oversize_key {
                debug!(key_len = key.len(), limit = descriptor.header.max_key_bytes, "oversize key, bypassing cache");
                return loader().await.map_err(CacheError::LoaderFailed);
            }
            warn!(key_len = key.len(), limit = descriptor.header.max_key_bytes, "oversize key, proceeding anyway");
        }

        // 4. Negative-lookup shield.
        if !descriptor.cache_nulls && !self.filter.might_contain(namespace, &key) {
            return Ok(None);
        }

        // 5. Read-through.
        if let Some(bytes) = self.coordinator.get(&key, &descriptor.header, descriptor.ttl_local).await {
            if bytes == NULL_MARKER {
                return Ok(None);
            }
            match decode_payload::<C, T>(&self.codec, &bytes) {
                Ok(value) => return Ok(Some(value)),
                Err(err) => {
                    warn!(key = %key, error = %err, "codec decode failed, treating as a miss");
                }
            }
        }

        // 6. Miss handling.
        self.handle_miss(descriptor, &key, args, loader).await
    }

    async fn handle_miss<T, F, Fut>(
        &self,
        descriptor: &CacheDescriptor,
        key: &str,
        args: &CallArgs,
        loader: F,
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        if !descriptor.hot_key {
            return self.regenerate(descriptor, key, args, loader).await;
        }

        let remote = self.coordinator.remote().clone();
        if remote.is_available() {
            let lease_key = format!("hot_key_lock:{key}");
            if remote.try_acquire_lease(&lease_key, self.hot_key.lease_ttl()).await {
                let guard = LeaseGuard::new(remote, lease_key);
                let result = self.regenerate(descriptor, key, args, loader).await;
                guard.release().await;
                return result;
            }
            return self.poll_for_result(descriptor, key).await;
        }

        // Remote unavailable: in-process coalescing fallback.
        self.regenerate_with_local_coalescing(descriptor, key, args, loader).await
    }

    async fn poll_for_result<T>(&self, descriptor: &CacheDescriptor, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        for _ in 0..self.hot_key.retry_count {
            sleep(self.hot_key.retry_interval()).await;
            if let Some(bytes) = self
                .coordinator
                .get(key, &descriptor.header, descriptor.ttl_local)
                .await
            {
                if bytes == NULL_MARKER {
                    return Ok(None);
                }
                match decode_payload::<C, T>(&self.codec, &bytes) {
                    Ok(value) => return Ok(Some(value)),
                    Err(err) => {
                        warn!(key = %key, error = %err, "codec decode failed during hot-key poll");
                    }
                }
            }
        }
        // Poll exhaustion bounds stampede cost; this is designed behavior,
        // not an error (§7).
        Ok(None)
    }

    async fn regenerate_with_local_coalescing<T, F, Fut>(
        &self,
        descriptor: &CacheDescriptor,
        key: &str,
        args: &CallArgs,
        loader: F,
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        let lock = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _permit = lock.lock().await;

        // Double-check: another caller may have populated the cache while
        // we waited for the coalescing lock.
        if let Some(bytes) = self
            .coordinator
            .get(key, &descriptor.header, descriptor.ttl_local)
            .await
        {
            if bytes == NULL_MARKER {
                self.cleanup_in_flight(key);
                return Ok(None);
            }
            match decode_payload::<C, T>(&self.codec, &bytes) {
                Ok(value) => {
                    self.cleanup_in_flight(key);
                    return Ok(Some(value));
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "codec decode failed after coalescing wait, treating as a miss");
                }
            }
        }

        let outcome = self.regenerate(descriptor, key, args, loader).await;
        self.cleanup_in_flight(key);
        outcome
    }

    fn cleanup_in_flight(&self, key: &str) {
        if let Some(entry) = self.in_flight.get(key) {
            if Arc::strong_count(&entry) <= 2 {
                drop(entry);
                self.in_flight.remove(key);
            }
        }
    }

    /// §4.6a regeneration: invoke the loader, resolve the TTL, encode, and
    /// write through on success.
    async fn regenerate<T, F, Fut>(
        &self,
        descriptor: &CacheDescriptor,
        key: &str,
        args: &CallArgs,
        loader: F,
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        let result = loader().await.map_err(CacheError::LoaderFailed)?;

        let Some(value) = result else {
            if descriptor.cache_nulls {
                self.coordinator
                    .put(key, &NULL_MARKER, &descriptor.header, NULL_TTL, NULL_TTL)
                    .await;
            }
            return Ok(None);
        };

        let resolved_ttl = self.resolve_ttl(descriptor, args, &value);

        match encode_payload(&*self.codec, &value, descriptor.header.compress, descriptor.header.compress_threshold) {
            Ok(bytes) => {
                self.filter.add(descriptor.namespace(), key);
                self.coordinator
                    .put(key, &bytes, &descriptor.header, descriptor.ttl_local, resolved_ttl)
                    .await;
            }
            Err(err) => {
                warn!(key = %key, error = %err, "codec encode failed, returning value without caching it");
            }
        }

        Ok(Some(value))
    }

    /// TTL resolution order (§4.6a): `ttl_expr` > `ttl_field` > `ttl_remote` > engine default.
    fn resolve_ttl<T: Serialize>(&self, descriptor: &CacheDescriptor, args: &CallArgs, value: &T) -> Duration {
        if let Some(expr) = &descriptor.ttl_expr {
            match self.evaluator.eval_ttl_seconds(expr, args) {
                Ok(Some(secs)) => return Duration::from_secs(secs.unsigned_abs()),
                Ok(None) => {}
                Err(err) => warn!(expr = %expr, error = %err, "ttl_expr evaluation failed, falling through"),
            }
        }

        if let Some(field) = &descriptor.ttl_field {
            if let Some(remaining) = extract_remaining_ttl(value, field) {
                return remaining;
            }
        }

        if descriptor.ttl_remote > Duration::ZERO {
            return descriptor.ttl_remote;
        }

        self.default_remote_ttl
    }
}

/// Reads `field` from `value`'s serialized form as an absolute epoch-seconds
/// timestamp and returns the remaining duration until that instant, if
/// positive.
fn extract_remaining_ttl<T: Serialize>(value: &T, field: &str) -> Option<Duration> {
    let json = serde_json::to_value(value).ok()?;
    let epoch = json.get(field)?.as_i64()?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs() as i64;
    let remaining = epoch - now;
    if remaining > 0 {
        Some(Duration::from_secs(remaining.unsigned_abs()))
    } else {
        None
    }
}
