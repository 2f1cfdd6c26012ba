//! Batch engine (C7) integration tests — scenario S5 and the boundary
//! behaviors from SPEC_FULL.md §8.

mod common;

use common::test_data::User;
use common::FakeRemoteTier;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tiered_cache_engine::expr::CallArgs;
use tiered_cache_engine::{BatchDescriptor, CacheEngine, DescriptorHeader, EngineConfig, LayerMask};

fn batch_descriptor() -> BatchDescriptor {
    BatchDescriptor {
        header: DescriptorHeader {
            logical_names: vec!["user".to_string()],
            layer_mask: LayerMask::REMOTE_ONLY,
            ..DescriptorHeader::default()
        },
        item_key_expr: "#ids".to_string(),
        pivot_param: "ids".to_string(),
        id_field: "id".to_string(),
        ttl_remote: Duration::from_secs(60),
    }
}

/// Scenario S5 — ids 10/11 are pre-populated; the bulk loader runs exactly
/// once with `[12, 13]`; the merged result preserves input order.
#[tokio::test]
async fn batch_merge_scenario_s5() {
    let remote = FakeRemoteTier::new();

    for id in [10u64, 11] {
        let framed = tiered_cache_engine::codec::encode_payload(
            &tiered_cache_engine::PostcardCodec,
            &User::new(id),
            false,
            4096,
        )
        .unwrap();
        remote.put(&format!("user::{id}"), &framed, Duration::from_secs(60)).await.unwrap();
    }

    let engine = CacheEngine::with_remote(remote, EngineConfig::default());
    let descriptor = batch_descriptor();
    let mut args = CallArgs::new();
    args.insert(
        "ids",
        serde_json::Value::Array(vec![
            serde_json::Value::from(10),
            serde_json::Value::from(11),
            serde_json::Value::from(12),
            serde_json::Value::from(13),
        ]),
    );

    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();
    let result: Vec<Option<User>> = engine
        .batch()
        .lookup(&descriptor, &args, move |missed| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let ids: Vec<u64> = missed.iter().map(|v| v.as_u64().unwrap()).collect();
                assert_eq!(ids, vec![12, 13], "bulk loader must run only with the missed ids");
                Ok(ids.into_iter().map(User::new).collect())
            }
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1, "bulk loader must run exactly once");
    assert_eq!(
        result,
        vec![Some(User::new(10)), Some(User::new(11)), Some(User::new(12)), Some(User::new(13))]
    );

    // A second call must find everything cached now (no further loader runs).
    let result2: Vec<Option<User>> = engine
        .batch()
        .lookup(&descriptor, &args, |_missed| async {
            panic!("everything should already be cached")
        })
        .await
        .unwrap();
    assert_eq!(result2, result);
}

/// An empty identifier sequence yields the empty sequence with zero
/// bulk-loader invocations.
#[tokio::test]
async fn empty_batch_short_circuits() {
    let remote = FakeRemoteTier::new();
    let engine = CacheEngine::with_remote(remote, EngineConfig::default());
    let descriptor = batch_descriptor();
    let mut args = CallArgs::new();
    args.insert("ids", serde_json::Value::Array(vec![]));

    let result: Vec<Option<User>> = engine
        .batch()
        .lookup(&descriptor, &args, |_missed| async { panic!("loader must not run for an empty batch") })
        .await
        .unwrap();
    assert!(result.is_empty());
}

/// A null identifier inside the batch input is skipped during projection
/// but preserved positionally in the output as null.
#[tokio::test]
async fn null_identifier_preserved_positionally() {
    let remote = FakeRemoteTier::new();
    let engine = CacheEngine::with_remote(remote, EngineConfig::default());
    let descriptor = batch_descriptor();
    let mut args = CallArgs::new();
    args.insert(
        "ids",
        serde_json::Value::Array(vec![serde_json::Value::from(40), serde_json::Value::Null, serde_json::Value::from(41)]),
    );

    let result: Vec<Option<User>> = engine
        .batch()
        .lookup(&descriptor, &args, |missed| async move {
            Ok(missed
                .into_iter()
                .map(|v| User::new(v.as_u64().unwrap()))
                .collect())
        })
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    assert!(result[1].is_none());
    assert_eq!(result[0], Some(User::new(40)));
    assert_eq!(result[2], Some(User::new(41)));
}
