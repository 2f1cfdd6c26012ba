//! Batch engine (C7) — descriptor-driven read-through for a collection of
//! domain identifiers, fanned out through the pipelined remote tier.
//!
//! No direct teacher analogue (the teacher has no batch path); grounded on
//! the remote tier's pipelining (`RemoteBackend::multi_get_pipelined`/
//! `multi_put_pipelined`, themselves grounded on `redis::pipe()`) and the
//! merge-by-id algorithm of SPEC_FULL.md §4.7, implemented fresh.
//!
//! Batch does not consult or populate the local tier (§4.7): reads and
//! writes target the remote tier only.

use crate::backends::RemoteBackend;
use crate::codec::{decode_payload, encode_payload, CacheCodec};
use crate::descriptor::BatchDescriptor;
use crate::error::{CacheError, CacheResult};
use crate::expr::{CallArgs, Evaluator};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

pub struct BatchEngine<C: CacheCodec> {
    remote: Arc<dyn RemoteBackend>,
    codec: Arc<C>,
    evaluator: Arc<dyn Evaluator>,
    default_remote_ttl: std::time::Duration,
}

impl<C: CacheCodec> BatchEngine<C> {
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteBackend>,
        codec: Arc<C>,
        evaluator: Arc<dyn Evaluator>,
        default_remote_ttl: std::time::Duration,
    ) -> Self {
        Self {
            remote,
            codec,
            evaluator,
            default_remote_ttl,
        }
    }

    /// Public contract of C7: given a batch descriptor, call arguments, and
    /// a bulk loader invoked with the missed identifiers, return a sequence
    /// aligned to the input identifier sequence in both length and order.
    pub async fn lookup<T, F, Fut>(
        &self,
        descriptor: &BatchDescriptor,
        args: &CallArgs,
        bulk_loader: F,
    ) -> CacheResult<Vec<Option<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + Clone,
        F: FnOnce(Vec<Value>) -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<T>>>,
    {
        // 1. Pivot identification.
        let Some(pivot) = args.get(&descriptor.pivot_param) else {
            warn!(
                pivot_param = %descriptor.pivot_param,
                "batch pivot argument absent, treating call as empty"
            );
            return Ok(Vec::new());
        };
        let Value::Array(ids) = pivot else {
            warn!(
                pivot_param = %descriptor.pivot_param,
                "item_key_expr does not reference a collection argument, proceeding as empty"
            );
            return Ok(Vec::new());
        };
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let namespace = descriptor.namespace();

        // 2. Projection: id -> qualified key, skipping null ids (preserved
        // positionally as null in the final merge instead).
        let mut id_to_key: HashMap<String, String> = HashMap::with_capacity(ids.len());
        for id in ids {
            if id.is_null() {
                continue;
            }
            let id_key = id_cache_key(id);
            if id_to_key.contains_key(&id_key) {
                continue;
            }
            let rebound = args.with_rebound(&descriptor.pivot_param, id.clone());
            let suffix = self
                .evaluator
                .eval_string(&descriptor.item_key_expr, &rebound)
                .map_err(|source| CacheError::ExpressionFailed {
                    expr: descriptor.item_key_expr.clone(),
                    source,
                })?;
            id_to_key.insert(id_key, format!("{namespace}::{suffix}"));
        }

        // 3. Bulk read, pipelined.
        let keys: Vec<String> = id_to_key.values().cloned().collect();
        let by_key = self.remote.multi_get_pipelined(&keys).await;
        let mut cached: HashMap<String, Vec<u8>> = HashMap::with_capacity(by_key.len());
        for (id_key, qualified_key) in &id_to_key {
            if let Some(bytes) = by_key.get(qualified_key) {
                cached.insert(id_key.clone(), bytes.clone());
            }
        }

        // 4. Miss set, preserving input order.
        let missed_ids: Vec<Value> = ids
            .iter()
            .filter(|id| !id.is_null())
            .filter(|id| !cached.contains_key(&id_cache_key(id)))
            .cloned()
            .collect();

        // 5. Bulk regenerate.
        let mut fresh: HashMap<String, T> = HashMap::new();
        if !missed_ids.is_empty() {
            let items = bulk_loader(missed_ids).await.map_err(CacheError::LoaderFailed)?;
            for item in items {
                let id_key = extract_item_id(&item, &descriptor.id_field)
                    .ok_or_else(|| {
                        CacheError::Misconfigured(format!(
                            "bulk loader result missing id field '{}'",
                            descriptor.id_field
                        ))
                    })?;
                // On duplicate ids returned, keep the first (§4.7 step 5).
                fresh.entry(id_key).or_insert(item);
            }
        }

        // 6. Bulk write, pipelined.
        if !fresh.is_empty() {
            let mut entries = Vec::with_capacity(fresh.len());
            for (id_key, item) in &fresh {
                let Some(qualified_key) = id_to_key.get(id_key) else {
                    continue;
                };
                match encode_payload(
                    &*self.codec,
                    item,
                    descriptor.header.compress,
                    descriptor.header.compress_threshold,
                ) {
                    Ok(bytes) => entries.push((qualified_key.clone(), bytes)),
                    Err(err) => {
                        warn!(key = %qualified_key, error = %err, "codec encode failed, skipping cache write for this item");
                    }
                }
            }
            let ttl = if descriptor.ttl_remote > std::time::Duration::ZERO {
                descriptor.ttl_remote
            } else {
                self.default_remote_ttl
            };
            self.remote.multi_put_pipelined(&entries, ttl).await;
        }

        // 7. Merge, preserving input order and length.
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if id.is_null() {
                results.push(None);
                continue;
            }
            let id_key = id_cache_key(id);
            if let Some(bytes) = cached.get(&id_key) {
                match decode_payload::<C, T>(&self.codec, bytes) {
                    Ok(value) => {
                        results.push(Some(value));
                        continue;
                    }
                    Err(err) => {
                        warn!(id_key = %id_key, error = %err, "codec decode failed for cached batch item, treating as miss");
                    }
                }
            }
            results.push(fresh.get(&id_key).cloned());
        }

        Ok(results)
    }
}

/// Canonical string form of an identifier used as an internal `HashMap` key.
/// Strings are used as-is; everything else renders via its JSON form, which
/// is stable and distinct across identifier types.
fn id_cache_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extracts `field` from `item`'s serialized form as the item's identifier.
fn extract_item_id<T: Serialize>(item: &T, field: &str) -> Option<String> {
    let json = serde_json::to_value(item).ok()?;
    let value = json.get(field)?;
    Some(id_cache_key(value))
}
