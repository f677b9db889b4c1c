//! Cache-aware fetch orchestration.
//!
//! Wraps a remote call with the freshness cache:
//!
//! 1. a fresh hit is returned without calling the remote side;
//! 2. otherwise the fetcher runs and its result is cached;
//! 3. if the fetcher fails with a transport or remote error and anything at
//!    all is cached for the key, that last-known value is served instead,
//!    flagged as a stale fallback. With nothing to fall back on the failure
//!    propagates unchanged.
//!
//! A fetched result is written back only if the cache was not invalidated
//! while the fetch was running, and no newer value landed for the key in
//! the meantime. The caller still receives it.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{try_join_all, BoxFuture};
use futures_util::FutureExt;
use policydesk_core::{
    DeskError, DeskResult, Notification, NotificationAction, NotificationSink, TransportError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::freshness::{CacheRead, FreshnessWindow, FreshnessWindows};
use crate::keys::{CacheKey, ResourceKind};
use crate::single_flight::{Flight, SingleFlight};
use crate::store::{FreshnessCache, WriteTicket};
use crate::traits::CacheStats;

/// Configuration for the fetch orchestrator.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Window used when a call does not pass one.
    pub default_window: FreshnessWindow,
    /// Per-resource window tiers.
    pub windows: FreshnessWindows,
    /// Coalesce concurrent misses for the same key into one remote call.
    pub dedupe_in_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_window: FreshnessWindow::SHORT,
            windows: FreshnessWindows::default(),
            dedupe_in_flight: true,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_window(mut self, window: FreshnessWindow) -> Self {
        self.default_window = window;
        self
    }

    pub fn with_windows(mut self, windows: FreshnessWindows) -> Self {
        self.windows = windows;
        self
    }

    pub fn with_dedupe(mut self, enabled: bool) -> Self {
        self.dedupe_in_flight = enabled;
        self
    }
}

/// One entry of a [`FetchOrchestrator::batch_fetch`] call.
pub struct BatchRequest<'a> {
    pub key: CacheKey,
    pub window: Option<FreshnessWindow>,
    /// Not polled at all when the cache already holds a fresh value.
    pub fetcher: BoxFuture<'a, DeskResult<Value>>,
}

impl<'a> BatchRequest<'a> {
    pub fn new<Fut>(key: CacheKey, fetcher: Fut) -> Self
    where
        Fut: Future<Output = DeskResult<Value>> + Send + 'a,
    {
        Self {
            key,
            window: None,
            fetcher: fetcher.boxed(),
        }
    }

    pub fn with_window(mut self, window: FreshnessWindow) -> Self {
        self.window = Some(window);
        self
    }
}

/// Serves reads through the freshness cache with stale-on-failure fallback.
///
/// Cheap to clone; clones share the cache and the in-flight registry.
#[derive(Clone)]
pub struct FetchOrchestrator {
    cache: Arc<FreshnessCache<Value>>,
    in_flight: Arc<SingleFlight>,
    config: CacheConfig,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl FetchOrchestrator {
    pub fn new(cache: Arc<FreshnessCache<Value>>, config: CacheConfig) -> Self {
        Self {
            cache,
            in_flight: Arc::new(SingleFlight::new()),
            config,
            notifier: None,
        }
    }

    /// Orchestrator over a fresh cache built from `config`.
    pub fn with_defaults(config: CacheConfig) -> Self {
        let cache = Arc::new(FreshnessCache::new(config.default_window));
        Self::new(cache, config)
    }

    /// Send a warning notification whenever stale data is served.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<FreshnessCache<Value>> {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Keys with a remote call currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.in_flight_count()
    }

    /// Read `key` through the cache, calling `fetcher` on a miss.
    ///
    /// `force_refresh` skips the fresh-hit check and always runs `fetcher`;
    /// it is the only way to bypass the cache. Any other call that finds a
    /// fetch for the same key already in flight, started since the last
    /// invalidation, waits for that fetch instead of issuing its own.
    pub async fn fetch_with_cache<T, F, Fut>(
        &self,
        key: impl AsRef<str>,
        fetcher: F,
        window: Option<FreshnessWindow>,
        force_refresh: bool,
    ) -> DeskResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = DeskResult<T>>,
    {
        let key = key.as_ref();
        if !force_refresh {
            if let Some(read) = self.fresh_read::<T>(key) {
                return Ok(read);
            }
        }

        if !self.config.dedupe_in_flight {
            let ticket = self.cache.ticket();
            return self
                .load(key, fetcher, window, ticket)
                .await
                .map(|(read, _)| read);
        }

        loop {
            let ticket = self.cache.ticket();
            let flight = if force_refresh {
                Flight::Leader(self.in_flight.lead(key, ticket.epoch))
            } else {
                self.in_flight.join(key, ticket.epoch)
            };
            match flight {
                Flight::Leader(guard) => {
                    // A flight may have landed between our miss and now.
                    if !force_refresh {
                        if let Some(read) = self.fresh_read::<T>(key) {
                            drop(guard);
                            return Ok(read);
                        }
                    }
                    return match self.load(key, fetcher, window, ticket).await {
                        Ok((read, shared)) => {
                            guard.complete(Ok(shared));
                            Ok(read)
                        }
                        Err(err) => {
                            guard.complete(Err(err.clone()));
                            Err(err)
                        }
                    };
                }
                Flight::Follower(mut receiver) => {
                    self.cache.record_coalesced();
                    match receiver.recv().await {
                        Ok(outcome) => {
                            return outcome.and_then(|shared| {
                                shared.try_map(|value| decode::<T>(key, value))
                            });
                        }
                        Err(_) => {
                            debug!(key, "In-flight leader went away, re-contending");
                            if let Some(read) = self.fresh_read::<T>(key) {
                                return Ok(read);
                            }
                        }
                    }
                }
            }
        }
    }

    /// [`FetchOrchestrator::fetch_with_cache`] with the default window and no
    /// forced refresh.
    pub async fn fetch<T, F, Fut>(&self, key: impl AsRef<str>, fetcher: F) -> DeskResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = DeskResult<T>>,
    {
        self.fetch_with_cache(key, fetcher, None, false).await
    }

    /// Run every request concurrently; results come back in input order.
    ///
    /// All-or-nothing: one request failing without a stale fallback fails
    /// the whole batch.
    pub async fn batch_fetch(
        &self,
        requests: Vec<BatchRequest<'_>>,
    ) -> DeskResult<Vec<CacheRead<Value>>> {
        let calls = requests.into_iter().map(|request| {
            let BatchRequest {
                key,
                window,
                fetcher,
            } = request;
            async move {
                self.fetch_with_cache(&key, move || fetcher, window, false)
                    .await
            }
        });
        try_join_all(calls).await
    }

    /// Clear everything, or every key containing `pattern`.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        self.cache.invalidate(pattern)
    }

    /// Drop every entry mentioning this entity id.
    pub fn invalidate_entity(&self, entity_id: impl std::fmt::Display) -> usize {
        let pattern = entity_id.to_string();
        self.cache.invalidate(Some(&pattern))
    }

    /// Drop every entry in a resource namespace.
    pub fn invalidate_resource(&self, kind: ResourceKind) -> usize {
        self.cache.invalidate(Some(kind.as_str()))
    }

    pub fn invalidate_all(&self) -> usize {
        self.cache.invalidate(None)
    }

    fn fresh_read<T: DeserializeOwned>(&self, key: &str) -> Option<CacheRead<T>> {
        let (value, captured_at) = self.cache.get_fresh_entry(key)?;
        match serde_json::from_value::<T>(value) {
            Ok(value) => {
                debug!(key, "Cache hit");
                Some(CacheRead::from_cache(value, captured_at))
            }
            Err(err) => {
                warn!(key, error = %err, "Cached value does not decode, treating as miss");
                None
            }
        }
    }

    /// Call the fetcher and cache its result, falling back to stale data on
    /// a recoverable failure. Returns the typed read plus its JSON form for
    /// in-flight followers.
    async fn load<T, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        window: Option<FreshnessWindow>,
        ticket: WriteTicket,
    ) -> DeskResult<(CacheRead<T>, CacheRead<Value>)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = DeskResult<T>>,
    {
        debug!(key, "Cache miss, fetching");
        match fetcher().await {
            Ok(value) => {
                let json = serde_json::to_value(&value).map_err(|err| {
                    DeskError::from(TransportError::Decode {
                        context: key.to_string(),
                        reason: err.to_string(),
                    })
                })?;
                let shared = CacheRead::from_remote(json.clone());
                self.cache.set_with_ticket(
                    key,
                    json,
                    window.or(Some(self.config.default_window)),
                    ticket,
                );
                Ok((CacheRead::from_remote(value), shared))
            }
            Err(err) => self.stale_fallback(key, err),
        }
    }

    /// Serve the last-known value for `key` in place of `err`. Without a
    /// usable entry, `err` is returned untouched and nothing is reported.
    fn stale_fallback<T: DeserializeOwned>(
        &self,
        key: &str,
        err: DeskError,
    ) -> DeskResult<(CacheRead<T>, CacheRead<Value>)> {
        if !err.is_recoverable() {
            return Err(err);
        }
        let Some((value, captured_at)) = self.cache.get_stale_entry(key) else {
            return Err(err);
        };
        let typed = match serde_json::from_value::<T>(value.clone()) {
            Ok(typed) => typed,
            Err(decode_err) => {
                warn!(
                    key,
                    error = %err,
                    decode_error = %decode_err,
                    "Fetch failed and cached value does not decode, no fallback"
                );
                return Err(err);
            }
        };
        self.cache.record_stale_fallback();
        warn!(key, error = %err, "Fetch failed, serving stale cache entry");
        if let Some(notifier) = &self.notifier {
            notifier.notify(
                Notification::warning("Showing previously loaded data; the latest could not be fetched")
                    .with_action(NotificationAction::Retry),
            );
        }
        Ok((
            CacheRead::stale_fallback(typed, captured_at),
            CacheRead::stale_fallback(value, captured_at),
        ))
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> DeskResult<T> {
    serde_json::from_value(value).map_err(|err| {
        TransportError::Decode {
            context: key.to_string(),
            reason: err.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use policydesk_core::{ChannelSink, NotificationLevel, RemoteError, ValidationError};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Count {
        n: u32,
    }

    fn unreachable() -> DeskError {
        TransportError::Unreachable {
            endpoint: "/api/policies".to_string(),
            reason: "connection refused".to_string(),
        }
        .into()
    }

    fn orchestrator() -> FetchOrchestrator {
        FetchOrchestrator::with_defaults(CacheConfig::default())
    }

    fn ms(ms: u64) -> Option<FreshnessWindow> {
        FreshnessWindow::from_millis(ms).ok()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_hit_skips_fetcher() {
        let orch = orchestrator();
        let calls = &AtomicUsize::new(0);
        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Count { n: 1 })
        };

        let first = orch.fetch_with_cache("k", fetch, ms(1000), false).await.unwrap();
        let second = orch.fetch_with_cache("k", fetch, ms(1000), false).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!first.was_cache_hit());
        assert!(second.was_cache_hit());
        assert_eq!(second.into_value(), Count { n: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_always_fetches() {
        let orch = orchestrator();
        let calls = &AtomicUsize::new(0);
        let fetch = move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) as u32;
            Ok(Count { n })
        };

        orch.fetch_with_cache("k", fetch, ms(60_000), false).await.unwrap();
        let refreshed = orch.fetch_with_cache("k", fetch, ms(60_000), true).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed.value(), &Count { n: 1 });
        assert_eq!(orch.cache().get("k"), Some(json!({"n": 1})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fallback_after_expiry() {
        let (sink, mut notes) = ChannelSink::new();
        let orch = orchestrator().with_notifier(Arc::new(sink));
        orch.fetch_with_cache("k", || async { Ok(Count { n: 1 }) }, ms(100), false)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        let read = orch
            .fetch_with_cache::<Count, _, _>("k", || async { Err(unreachable()) }, ms(100), false)
            .await
            .unwrap();

        assert!(read.is_degraded());
        assert_eq!(read.into_value(), Count { n: 1 });
        assert_eq!(orch.stats().stale_fallbacks, 1);
        let note = notes.try_recv().unwrap();
        assert_eq!(note.level, NotificationLevel::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_miss_propagates() {
        let orch = orchestrator();
        let result = orch
            .fetch_with_cache::<Count, _, _>("k", || async { Err(unreachable()) }, None, false)
            .await;
        assert_eq!(result.unwrap_err(), unreachable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_recoverable_error_skips_fallback() {
        let orch = orchestrator();
        orch.cache().set("k", json!({"n": 1}), ms(10));
        tokio::time::advance(Duration::from_millis(20)).await;

        let err: DeskError = ValidationError::RequiredFieldMissing {
            field: "id".to_string(),
        }
        .into();
        let expected = err.clone();
        let result = orch
            .fetch_with_cache::<Count, _, _>("k", || async { Err(err) }, None, false)
            .await;
        assert_eq!(result.unwrap_err(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_error_falls_back_too() {
        let orch = orchestrator();
        orch.cache().set("k", json!({"n": 9}), ms(10));
        tokio::time::advance(Duration::from_millis(20)).await;

        let read = orch
            .fetch_with_cache::<Count, _, _>(
                "k",
                || async {
                    Err(RemoteError::Status {
                        status: 502,
                        code: None,
                        message: "bad gateway".to_string(),
                    }
                    .into())
                },
                None,
                false,
            )
            .await
            .unwrap();
        assert_eq!(read.into_value(), Count { n: 9 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_result_is_returned_but_not_cached() {
        let orch = orchestrator();
        let read = orch
            .fetch::<Option<Count>, _, _>("k", || async { Ok(None) })
            .await
            .unwrap();
        assert_eq!(read.into_value(), None);
        assert!(orch.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_coalesce() {
        let orch = orchestrator();
        let calls = &AtomicUsize::new(0);
        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Count { n: 3 })
        };

        let (a, b, c) = tokio::join!(
            orch.fetch::<Count, _, _>("k", fetch),
            orch.fetch::<Count, _, _>("k", fetch),
            orch.fetch::<Count, _, _>("k", fetch),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for read in [a, b, c] {
            assert_eq!(read.unwrap().into_value(), Count { n: 3 });
        }
        assert_eq!(orch.stats().coalesced, 2);
        assert_eq!(orch.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_failure_reaches_every_waiter() {
        let orch = orchestrator();
        let calls = &AtomicUsize::new(0);
        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<Count, _>(unreachable())
        };

        let (a, b) = tokio::join!(orch.fetch("k", fetch), orch.fetch("k", fetch));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(a.is_err());
        assert!(b.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_dedupe_each_miss_fetches() {
        let orch = FetchOrchestrator::with_defaults(CacheConfig::new().with_dedupe(false));
        let calls = &AtomicUsize::new(0);
        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Count { n: 3 })
        };

        let (a, b) = tokio::join!(
            orch.fetch::<Count, _, _>("k", fetch),
            orch.fetch::<Count, _, _>("k", fetch)
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_leader_hands_over() {
        let orch = orchestrator();
        let leader = tokio::spawn({
            let orch = orch.clone();
            async move {
                orch.fetch::<Count, _, _>("k", || async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Count { n: 0 })
                })
                .await
            }
        });
        tokio::task::yield_now().await;

        let follower = tokio::spawn({
            let orch = orch.clone();
            async move {
                orch.fetch::<Count, _, _>("k", || async { Ok(Count { n: 5 }) })
                    .await
            }
        });
        tokio::task::yield_now().await;
        assert_eq!(orch.stats().coalesced, 1);

        leader.abort();
        let read = follower.await.unwrap().unwrap();
        assert_eq!(read.into_value(), Count { n: 5 });
        assert_eq!(orch.cache().get("k"), Some(json!({"n": 5})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_refresh_does_not_wait_on_running_fetch() {
        let orch = orchestrator();
        let forced_calls = &AtomicUsize::new(0);

        let slow = orch.fetch::<Count, _, _>("k", || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Count { n: 1 })
        });
        let forced = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            orch.fetch_with_cache::<Count, _, _>(
                "k",
                move || async move {
                    forced_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Count { n: 2 })
                },
                None,
                true,
            )
            .await
        };
        let (slow, forced) = tokio::join!(slow, forced);

        assert_eq!(forced_calls.load(Ordering::SeqCst), 1);
        assert_eq!(forced.unwrap().into_value(), Count { n: 2 });
        assert_eq!(slow.unwrap().into_value(), Count { n: 1 });
        // The older fetch finished last but does not overwrite.
        assert_eq!(orch.cache().get("k"), Some(json!({"n": 2})));
        assert_eq!(orch.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_blocks_write_back_of_running_fetch() {
        let orch = orchestrator();
        let slow = orch.fetch::<Count, _, _>("k", || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Count { n: 1 })
        });
        let invalidate = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            orch.invalidate_entity("k");
        };
        let (slow, ()) = tokio::join!(slow, invalidate);

        assert_eq!(slow.unwrap().into_value(), Count { n: 1 });
        assert!(orch.cache().get_stale("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_stale_entry_keeps_original_error() {
        let (sink, mut notes) = ChannelSink::new();
        let orch = orchestrator().with_notifier(Arc::new(sink));
        orch.cache().set("k", json!("not a count"), ms(1));
        tokio::time::advance(Duration::from_millis(5)).await;

        let result = orch
            .fetch::<Count, _, _>("k", || async { Err(unreachable()) })
            .await;

        assert_eq!(result.unwrap_err(), unreachable());
        assert_eq!(orch.stats().stale_fallbacks, 0);
        assert!(notes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_preserves_order() {
        let orch = orchestrator();
        orch.cache().set("b", json!("cached"), None);

        let reads = orch
            .batch_fetch(vec![
                BatchRequest::new(CacheKey::raw("a"), async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(json!("first"))
                }),
                BatchRequest::new(CacheKey::raw("b"), async { Ok(json!("never polled")) }),
                BatchRequest::new(CacheKey::raw("c"), async { Ok(json!("third")) })
                    .with_window(FreshnessWindow::LONG),
            ])
            .await
            .unwrap();

        let values: Vec<Value> = reads.into_iter().map(CacheRead::into_value).collect();
        assert_eq!(values, vec![json!("first"), json!("cached"), json!("third")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_is_all_or_nothing() {
        let orch = orchestrator();
        let result = orch
            .batch_fetch(vec![
                BatchRequest::new(CacheKey::raw("a"), async { Ok(json!(1)) }),
                BatchRequest::new(CacheKey::raw("b"), async { Err(unreachable()) }),
            ])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_helpers() {
        let orch = orchestrator();
        orch.cache().set(CacheKey::policy_complete(42), json!(1), None);
        orch.cache().set(CacheKey::recent_policies(10), json!(2), None);
        orch.cache().set(CacheKey::carriers(), json!(3), None);

        assert_eq!(orch.invalidate_entity(42), 1);
        assert_eq!(orch.invalidate_resource(ResourceKind::RecentPolicies), 1);
        assert!(orch.cache().has(CacheKey::carriers()));
        assert_eq!(orch.invalidate_all(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_scenario() {
        let orch = FetchOrchestrator::with_defaults(
            CacheConfig::new().with_default_window(FreshnessWindow::from_millis(5000).unwrap()),
        );
        orch.cache().set("k", json!({"n": 1}), None);

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(orch.cache().get("k"), Some(json!({"n": 1})));

        tokio::time::advance(Duration::from_millis(5000)).await;
        assert_eq!(orch.cache().get("k"), None);

        tokio::time::advance(Duration::from_millis(1)).await;
        let calls = &AtomicUsize::new(0);
        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Count { n: 2 })
        };
        let first = orch.fetch("k", fetch).await.unwrap();
        let second = orch.fetch("k", fetch).await.unwrap();

        assert_eq!(first.into_value(), Count { n: 2 });
        assert_eq!(second.into_value(), Count { n: 2 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
