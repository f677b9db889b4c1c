//! Dashboard data access built on the cache, operation and watcher layers.

use std::sync::Arc;

use async_trait::async_trait;
use policydesk_cache::{
    BatchRequest, CacheKey, CacheRead, FetchOrchestrator, FreshnessCache, ResourceKind,
};
use policydesk_core::{
    DeskResult, NotificationSink, ProcessingStatus, TransportError, UploadFileRecord,
};
use policydesk_ops::{AsyncOperation, PollConfig, StatusSource, StatusWatcher, WatchState, WatcherHandle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::api_client::PolicyApi;
use crate::config::ClientConfig;
use crate::types::{Carrier, DashboardStats, PolicyComplete, PolicyId, PolicyStatus, PolicySummary};

/// Everything the dashboard landing view shows.
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub recent: CacheRead<Vec<PolicySummary>>,
    pub stats: CacheRead<DashboardStats>,
    pub carriers: CacheRead<Vec<Carrier>>,
}

impl DashboardSnapshot {
    /// True if any part was served from stale cache after a failure.
    pub fn is_degraded(&self) -> bool {
        self.recent.is_degraded() || self.stats.is_degraded() || self.carriers.is_degraded()
    }
}

pub struct PolicyService<A: PolicyApi> {
    api: Arc<A>,
    orchestrator: FetchOrchestrator,
    poll: PollConfig,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl<A: PolicyApi> PolicyService<A> {
    pub fn new(api: Arc<A>, orchestrator: FetchOrchestrator, poll: PollConfig) -> Self {
        Self {
            api,
            orchestrator,
            poll,
            notifier: None,
        }
    }

    /// Service with a fresh cache sized from `config`.
    pub fn from_config(api: Arc<A>, config: &ClientConfig) -> DeskResult<Self> {
        let cache_config = config.cache_config()?;
        let cache = Arc::new(FreshnessCache::new(cache_config.default_window));
        Ok(Self::new(
            api,
            FetchOrchestrator::new(cache, cache_config),
            config.poll_config(),
        ))
    }

    /// Route stale-data warnings and job notifications to `sink`.
    pub fn with_notifier(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.orchestrator = self.orchestrator.with_notifier(Arc::clone(&sink));
        self.notifier = Some(sink);
        self
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    pub async fn recent_policies(
        &self,
        limit: u32,
        force_refresh: bool,
    ) -> DeskResult<CacheRead<Vec<PolicySummary>>> {
        let api = Arc::clone(&self.api);
        let window = self.orchestrator.config().windows.short;
        self.orchestrator
            .fetch_with_cache(
                CacheKey::recent_policies(limit),
                || async move { api.recent_policies(limit).await },
                Some(window),
                force_refresh,
            )
            .await
    }

    pub async fn policy_complete(
        &self,
        id: PolicyId,
        force_refresh: bool,
    ) -> DeskResult<CacheRead<PolicyComplete>> {
        let api = Arc::clone(&self.api);
        let window = self.orchestrator.config().windows.medium;
        self.orchestrator
            .fetch_with_cache(
                CacheKey::policy_complete(id),
                || async move { api.policy_complete(id).await },
                Some(window),
                force_refresh,
            )
            .await
    }

    pub async fn carriers(&self, force_refresh: bool) -> DeskResult<CacheRead<Vec<Carrier>>> {
        let api = Arc::clone(&self.api);
        let window = self.orchestrator.config().windows.long;
        self.orchestrator
            .fetch_with_cache(
                CacheKey::carriers(),
                || async move { api.carriers().await },
                Some(window),
                force_refresh,
            )
            .await
    }

    pub async fn dashboard_stats(&self, force_refresh: bool) -> DeskResult<CacheRead<DashboardStats>> {
        let api = Arc::clone(&self.api);
        let window = self.orchestrator.config().windows.short;
        self.orchestrator
            .fetch_with_cache(
                CacheKey::dashboard_stats(),
                || async move { api.dashboard_stats().await },
                Some(window),
                force_refresh,
            )
            .await
    }

    /// Load the landing view in one concurrent batch. Fails as a whole if any
    /// part fails with nothing cached to fall back on.
    pub async fn load_dashboard(&self, recent_limit: u32) -> DeskResult<DashboardSnapshot> {
        let windows = self.orchestrator.config().windows;
        let recent_api = Arc::clone(&self.api);
        let stats_api = Arc::clone(&self.api);
        let carriers_api = Arc::clone(&self.api);

        let requests = vec![
            BatchRequest::new(
                CacheKey::recent_policies(recent_limit),
                as_json(async move { recent_api.recent_policies(recent_limit).await }),
            )
            .with_window(windows.short),
            BatchRequest::new(
                CacheKey::dashboard_stats(),
                as_json(async move { stats_api.dashboard_stats().await }),
            )
            .with_window(windows.short),
            BatchRequest::new(
                CacheKey::carriers(),
                as_json(async move { carriers_api.carriers().await }),
            )
            .with_window(windows.long),
        ];

        let mut reads = self.orchestrator.batch_fetch(requests).await?.into_iter();
        let (Some(recent), Some(stats), Some(carriers)) = (reads.next(), reads.next(), reads.next())
        else {
            return Err(TransportError::Decode {
                context: "dashboard".to_string(),
                reason: "batch returned fewer results than requested".to_string(),
            }
            .into());
        };
        let snapshot = DashboardSnapshot {
            recent: recent.try_map(|v| decode(CacheKey::recent_policies(recent_limit), v))?,
            stats: stats.try_map(|v| decode(CacheKey::dashboard_stats(), v))?,
            carriers: carriers.try_map(|v| decode(CacheKey::carriers(), v))?,
        };
        debug!(degraded = snapshot.is_degraded(), "Dashboard loaded");
        Ok(snapshot)
    }

    /// Change a policy's status, then drop every cached view it appears in.
    pub async fn update_policy_status(
        &self,
        id: PolicyId,
        status: PolicyStatus,
    ) -> DeskResult<PolicySummary> {
        let updated = self.api.update_policy_status(id, status).await?;
        let removed = self.invalidate_policy(id);
        info!(policy_id = %id, status = %status, invalidated = removed, "Policy status updated");
        Ok(updated)
    }

    /// [`PolicyService::update_policy_status`] tracked by `operation`, showing
    /// `current` with the new status until the server confirms.
    pub async fn update_policy_status_tracked(
        &self,
        operation: &AsyncOperation<PolicySummary>,
        current: &PolicySummary,
        status: PolicyStatus,
    ) -> DeskResult<PolicySummary> {
        let optimistic = PolicySummary {
            status,
            ..current.clone()
        };
        operation
            .execute(self.update_policy_status(current.id, status), Some(optimistic))
            .await
    }

    /// Drop the policy's own entries plus the aggregates that list it.
    pub fn invalidate_policy(&self, id: PolicyId) -> usize {
        self.orchestrator.invalidate_entity(id)
            + self.orchestrator.invalidate_resource(ResourceKind::RecentPolicies)
            + self.orchestrator.invalidate_resource(ResourceKind::DashboardStats)
    }

    /// Watch a document processing job until it settles.
    pub fn watch_processing(
        &self,
        job_id: impl Into<String>,
    ) -> DeskResult<WatcherHandle<ProcessingStatus>> {
        let source = ProcessingStatusSource {
            api: Arc::clone(&self.api),
            job_id: job_id.into(),
        };
        StatusWatcher::spawn(source, self.poll.clone(), self.notifier.clone())
    }

    /// Drive `record` from its processing job until the job settles. Returns
    /// the watcher's final state.
    pub async fn follow_upload(
        &self,
        record: &mut UploadFileRecord,
        job_id: impl Into<String>,
    ) -> DeskResult<WatchState<ProcessingStatus>> {
        let watcher = self.watch_processing(job_id)?;
        let mut updates = watcher.subscribe();
        loop {
            let state = updates.borrow_and_update().clone();
            match &state {
                WatchState::Failed { error, .. } => {
                    record.fail(error.to_string());
                }
                _ => {
                    if let Some(status) = state.last_status() {
                        record.apply_processing_status(status);
                    }
                }
            }
            if state.is_final() {
                return Ok(state);
            }
            if updates.changed().await.is_err() {
                return Ok(watcher.state());
            }
        }
    }
}

/// Status source backed by the processing-status endpoint.
pub struct ProcessingStatusSource<A: PolicyApi> {
    api: Arc<A>,
    job_id: String,
}

#[async_trait]
impl<A: PolicyApi> StatusSource for ProcessingStatusSource<A> {
    type Status = ProcessingStatus;

    fn job_id(&self) -> &str {
        &self.job_id
    }

    async fn fetch_status(&self) -> DeskResult<ProcessingStatus> {
        Ok(self.api.processing_status(&self.job_id).await?.status)
    }
}

fn as_json<'a, T, Fut>(fetch: Fut) -> impl std::future::Future<Output = DeskResult<Value>> + Send + 'a
where
    T: Serialize + Send + 'a,
    Fut: std::future::Future<Output = DeskResult<T>> + Send + 'a,
{
    async move {
        let value = fetch.await?;
        serde_json::to_value(value).map_err(|e| {
            TransportError::Decode {
                context: "batch request".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

fn decode<T: DeserializeOwned>(key: CacheKey, value: Value) -> DeskResult<T> {
    serde_json::from_value(value).map_err(|e| {
        TransportError::Decode {
            context: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
