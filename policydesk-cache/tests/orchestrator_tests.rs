//! Orchestrator behaviour seen through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use policydesk_cache::{
    BatchRequest, CacheConfig, CacheKey, FetchOrchestrator, FreshnessCache, FreshnessWindow,
    ReadSource, ResourceKind,
};
use policydesk_core::{ChannelSink, DeskError, RemoteError, TransportError};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Stats {
    total: u64,
    active: u64,
}

fn offline() -> DeskError {
    TransportError::Unreachable {
        endpoint: "/api/dashboard/stats".to_string(),
        reason: "connection refused".to_string(),
    }
    .into()
}

fn orchestrator(window: Duration) -> FetchOrchestrator {
    let window = FreshnessWindow::new(window).unwrap();
    FetchOrchestrator::with_defaults(CacheConfig::new().with_default_window(window))
}

#[tokio::test(start_paused = true)]
async fn test_typed_read_lifecycle() {
    let orch = orchestrator(Duration::from_secs(60));
    let key = CacheKey::dashboard_stats();
    let calls = &AtomicUsize::new(0);
    let fetch = move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, DeskError>(Stats { total: 12, active: 9 })
    };

    let first = orch.fetch::<Stats, _, _>(&key, fetch).await.unwrap();
    assert_eq!(first.source(), ReadSource::Remote);

    tokio::time::advance(Duration::from_secs(60)).await;
    let boundary = orch.fetch::<Stats, _, _>(&key, fetch).await.unwrap();
    assert_eq!(boundary.source(), ReadSource::Cache);
    assert_eq!(boundary.value(), first.value());

    tokio::time::advance(Duration::from_millis(1)).await;
    let refreshed = orch.fetch::<Stats, _, _>(&key, fetch).await.unwrap();
    assert_eq!(refreshed.source(), ReadSource::Remote);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_outage_serves_last_known_value() {
    let orch = orchestrator(Duration::from_secs(5));
    let key = CacheKey::dashboard_stats();

    orch.fetch::<Stats, _, _>(&key, || async { Ok(Stats { total: 3, active: 1 }) })
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;

    let degraded = orch
        .fetch::<Stats, _, _>(&key, || async { Err(offline()) })
        .await
        .unwrap();
    assert!(degraded.is_degraded());
    assert_eq!(degraded.value().total, 3);
    assert!(degraded.age() >= Duration::from_secs(30));

    let stats = orch.stats();
    assert_eq!(stats.stale_fallbacks, 1);
    assert_eq!(stats.entry_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_without_cache_surfaces() {
    let orch = orchestrator(Duration::from_secs(5));
    let result = orch
        .fetch::<Stats, _, _>(CacheKey::policy_complete("gone"), || async {
            Err(RemoteError::NotFound {
                resource: "policy gone".to_string(),
            }
            .into())
        })
        .await;
    assert!(matches!(
        result,
        Err(DeskError::Remote(RemoteError::NotFound { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_readers_share_one_fetch() {
    let orch = orchestrator(Duration::from_secs(60));
    let calls = &AtomicUsize::new(0);
    let fetch = move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, DeskError>(vec![1u32, 2, 3])
    };

    let key = CacheKey::carriers();
    let (a, b, c, d) = tokio::join!(
        orch.fetch::<Vec<u32>, _, _>(&key, fetch),
        orch.fetch::<Vec<u32>, _, _>(&key, fetch),
        orch.fetch::<Vec<u32>, _, _>(&key, fetch),
        orch.fetch::<Vec<u32>, _, _>(&key, fetch),
    );
    for read in [a, b, c, d] {
        assert_eq!(read.unwrap().into_value(), vec![1, 2, 3]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(orch.stats().coalesced, 3);
    assert_eq!(orch.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_mixes_cached_and_remote() {
    let orch = orchestrator(Duration::from_secs(60));
    orch.cache()
        .set(CacheKey::carriers(), json!(["Harbor Mutual"]), None);

    let reads = orch
        .batch_fetch(vec![
            BatchRequest::new(CacheKey::dashboard_stats(), async {
                Ok(json!({"total": 1, "active": 1}))
            }),
            BatchRequest::new(CacheKey::carriers(), async {
                Err::<Value, _>(offline())
            }),
        ])
        .await
        .unwrap();

    assert_eq!(reads[0].source(), ReadSource::Remote);
    assert_eq!(reads[1].source(), ReadSource::Cache);
    assert_eq!(reads[1].value(), &json!(["Harbor Mutual"]));
}

#[tokio::test(start_paused = true)]
async fn test_shared_cache_between_orchestrators() {
    let cache = Arc::new(FreshnessCache::new(FreshnessWindow::SHORT));
    let writer = FetchOrchestrator::new(Arc::clone(&cache), CacheConfig::default());
    let reader = FetchOrchestrator::new(Arc::clone(&cache), CacheConfig::default());

    writer
        .fetch::<u32, _, _>(CacheKey::recent_policies(10), || async { Ok(7) })
        .await
        .unwrap();
    let read = reader
        .fetch::<u32, _, _>(CacheKey::recent_policies(10), || async { Err(offline()) })
        .await
        .unwrap();
    assert!(read.was_cache_hit());

    assert_eq!(reader.invalidate_resource(ResourceKind::RecentPolicies), 1);
    assert!(cache.is_empty());
}

fn stats(total: u64) -> Stats {
    Stats { total, active: 0 }
}

#[tokio::test(start_paused = true)]
async fn test_forced_refresh_after_invalidation_ignores_older_fetch() {
    let orch = orchestrator(Duration::from_secs(300));
    let key = CacheKey::dashboard_stats();
    let forced_calls = &AtomicUsize::new(0);

    let before_update = orch.fetch::<Stats, _, _>(&key, || async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(stats(1))
    });
    let after_update = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        orch.invalidate(None);
        orch.fetch_with_cache::<Stats, _, _>(
            &key,
            move || async move {
                forced_calls.fetch_add(1, Ordering::SeqCst);
                Ok(stats(2))
            },
            None,
            true,
        )
        .await
    };
    let (before_update, after_update) = tokio::join!(before_update, after_update);

    assert_eq!(before_update.unwrap().value().total, 1);
    let refreshed = after_update.unwrap();
    assert_eq!(refreshed.source(), ReadSource::Remote);
    assert_eq!(refreshed.value().total, 2);
    assert_eq!(forced_calls.load(Ordering::SeqCst), 1);
    assert_eq!(orch.cache().get(&key), Some(json!({"total": 2, "active": 0})));
}

#[tokio::test(start_paused = true)]
async fn test_reader_after_invalidation_starts_its_own_fetch() {
    let orch = orchestrator(Duration::from_secs(300));
    let key = CacheKey::dashboard_stats();
    let calls = &AtomicUsize::new(0);

    let old = orch.fetch::<Stats, _, _>(&key, || async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(stats(1))
    });
    let fresh = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        orch.invalidate_all();
        orch.fetch::<Stats, _, _>(&key, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(stats(2))
        })
        .await
    };
    let (old, fresh) = tokio::join!(old, fresh);

    assert_eq!(old.unwrap().value().total, 1);
    assert_eq!(fresh.unwrap().value().total, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(orch.stats().coalesced, 0);

    let cached = orch.fetch::<Stats, _, _>(&key, || async { Err(offline()) }).await.unwrap();
    assert!(cached.was_cache_hit());
    assert_eq!(cached.value().total, 2);
}

#[tokio::test(start_paused = true)]
async fn test_outage_with_undecodable_cache_reports_the_outage() {
    let (sink, mut notes) = ChannelSink::new();
    let orch = orchestrator(Duration::from_secs(5)).with_notifier(Arc::new(sink));
    let key = CacheKey::dashboard_stats();
    orch.cache().set(key.clone(), json!("not stats"), None);
    tokio::time::advance(Duration::from_secs(30)).await;

    let result = orch.fetch::<Stats, _, _>(&key, || async { Err(offline()) }).await;

    assert_eq!(result.unwrap_err(), offline());
    assert_eq!(orch.stats().stale_fallbacks, 0);
    assert!(notes.try_recv().is_err());
    // The entry stays for a reader that can decode it.
    assert_eq!(orch.cache().get_stale(&key), Some(json!("not stats")));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_invalidate_removes_exactly_matching_keys(
        keys in prop::collection::hash_set("[a-z]{1,6}(-[a-z0-9]{1,4}){0,2}", 0..16),
        pattern in "[a-z]{1,3}",
    ) {
        let cache: FreshnessCache = FreshnessCache::new(FreshnessWindow::LONG);
        for key in &keys {
            cache.set(key.clone(), json!(1), None);
        }
        let expected = keys.iter().filter(|k| k.contains(pattern.as_str())).count();

        prop_assert_eq!(cache.invalidate(Some(&pattern)), expected);
        prop_assert_eq!(cache.len(), keys.len() - expected);
        for key in &keys {
            prop_assert_eq!(cache.get_stale(key).is_some(), !key.contains(pattern.as_str()));
        }
    }

    #[test]
    fn prop_windows_must_be_positive(millis in 0u64..10_000) {
        let window = FreshnessWindow::from_millis(millis);
        prop_assert_eq!(window.is_ok(), millis > 0);
    }
}
