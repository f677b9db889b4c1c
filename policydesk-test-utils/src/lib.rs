//! POLICYDESK Test Utilities
//!
//! Shared test infrastructure for the POLICYDESK workspace:
//! - Scripted fetchers and status sources
//! - A recording notification sink
//! - An in-memory `PolicyApi`
//! - Proptest generators, fixtures and assertions

pub use policydesk_client::{
    Carrier, ClientConfig, DashboardStats, PolicyApi, PolicyComplete, PolicyId, PolicyStatus,
    PolicySummary, ProcessingStatusResponse,
};
pub use policydesk_core::{
    DeskError, DeskResult, JobStatus, Notification, NotificationLevel, NotificationSink,
    ProcessingStatus, RemoteError, RetryConfig, TransportError,
};
pub use policydesk_ops::{PollConfig, StatusSource, WatchState};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pop the next scripted step, repeating the last one once the script runs out.
fn next_step<T: Clone>(steps: &mut VecDeque<T>) -> Option<T> {
    if steps.len() > 1 {
        steps.pop_front()
    } else {
        steps.front().cloned()
    }
}

// ============================================================================
// SCRIPTED REMOTE CALLS
// ============================================================================

/// Remote call that replays a fixed script of results.
///
/// Use as `|| fetcher.fetch()` wherever a fetcher closure is expected.
pub struct ScriptedFetcher<T> {
    steps: Mutex<VecDeque<DeskResult<T>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl<T: Clone + Send> ScriptedFetcher<T> {
    pub fn new(steps: Vec<DeskResult<T>>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(value: T) -> Self {
        Self::new(vec![Ok(value)])
    }

    pub fn failing(err: DeskError) -> Self {
        Self::new(vec![Err(err)])
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn fetch(&self) -> DeskResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next_step(&mut lock(&self.steps)).unwrap_or_else(|| {
            Err(TransportError::Unreachable {
                endpoint: "scripted".to_string(),
                reason: "script is empty".to_string(),
            }
            .into())
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Status source that replays a script of statuses.
pub struct ScriptedStatusSource<S: JobStatus> {
    job_id: String,
    steps: Mutex<VecDeque<DeskResult<S>>>,
    calls: Arc<AtomicU32>,
}

impl<S: JobStatus> ScriptedStatusSource<S> {
    pub fn new(job_id: impl Into<String>, steps: Vec<DeskResult<S>>) -> Self {
        Self {
            job_id: job_id.into(),
            steps: Mutex::new(steps.into()),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn statuses(job_id: impl Into<String>, statuses: Vec<S>) -> Self {
        Self::new(job_id, statuses.into_iter().map(Ok).collect())
    }

    /// Call counter that stays readable after the source moves into a watcher.
    pub fn call_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl<S: JobStatus> StatusSource for ScriptedStatusSource<S> {
    type Status = S;

    fn job_id(&self) -> &str {
        &self.job_id
    }

    async fn fetch_status(&self) -> DeskResult<S> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        next_step(&mut lock(&self.steps)).unwrap_or_else(|| {
            Err(RemoteError::NotFound {
                resource: self.job_id.clone(),
            }
            .into())
        })
    }
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// Sink that keeps every notification it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.seen).clone()
    }

    pub fn levels(&self) -> Vec<NotificationLevel> {
        lock(&self.seen).iter().map(|n| n.level).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.seen).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_sink(&self) -> Arc<dyn NotificationSink> {
        Arc::new(self.clone())
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        lock(&self.seen).push(notification);
    }
}

// ============================================================================
// MOCK API
// ============================================================================

#[derive(Default)]
struct MockState {
    /// Newest first.
    policies: Vec<PolicyComplete>,
    carriers: Vec<Carrier>,
    stats: DashboardStats,
    jobs: HashMap<String, VecDeque<DeskResult<ProcessingStatus>>>,
    offline: bool,
}

/// In-memory dashboard API with per-method call counts.
#[derive(Default)]
pub struct MockPolicyApi {
    state: Mutex<MockState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    delay: Option<Duration>,
    method_delays: HashMap<&'static str, Duration>,
}

impl MockPolicyApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Three policies, two carriers and matching stats.
    pub fn seeded() -> Self {
        let api = Self::new();
        {
            let mut state = lock(&api.state);
            state.policies = vec![
                fixtures::policy_complete(fixtures::policy_summary("HO-1003", PolicyStatus::PendingReview)),
                fixtures::policy_complete(fixtures::policy_summary("AU-1002", PolicyStatus::Active)),
                fixtures::policy_complete(fixtures::policy_summary("HO-1001", PolicyStatus::Active)),
            ];
            state.carriers = fixtures::carriers();
            state.stats = fixtures::dashboard_stats();
        }
        api
    }

    pub fn with_policy(self, policy: PolicyComplete) -> Self {
        lock(&self.state).policies.insert(0, policy);
        self
    }

    pub fn with_job(self, job_id: impl Into<String>, steps: Vec<DeskResult<ProcessingStatus>>) -> Self {
        lock(&self.state).jobs.insert(job_id.into(), steps.into());
        self
    }

    /// Every response arrives this long after the call. The answer reflects
    /// the state when the call was made.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// [`MockPolicyApi::with_delay`] for one method only.
    pub fn with_method_delay(mut self, method: &'static str, delay: Duration) -> Self {
        self.method_delays.insert(method, delay);
        self
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.state).offline = offline;
    }

    pub fn set_stats(&self, stats: DashboardStats) {
        lock(&self.state).stats = stats;
    }

    pub fn policies(&self) -> Vec<PolicySummary> {
        lock(&self.state)
            .policies
            .iter()
            .map(|p| p.summary.clone())
            .collect()
    }

    pub fn calls(&self, method: &str) -> usize {
        lock(&self.calls).get(method).copied().unwrap_or(0)
    }

    fn enter(&self, method: &'static str) -> DeskResult<()> {
        *lock(&self.calls).entry(method).or_insert(0) += 1;
        if lock(&self.state).offline {
            return Err(TransportError::Unreachable {
                endpoint: method.to_string(),
                reason: "mock API is offline".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn respond<T>(&self, method: &'static str, response: DeskResult<T>) -> DeskResult<T> {
        if let Some(delay) = self.method_delays.get(method).copied().or(self.delay) {
            tokio::time::sleep(delay).await;
        }
        response
    }
}

fn not_found(resource: String) -> DeskError {
    RemoteError::NotFound { resource }.into()
}

#[async_trait]
impl PolicyApi for MockPolicyApi {
    async fn recent_policies(&self, limit: u32) -> DeskResult<Vec<PolicySummary>> {
        self.enter("recent_policies")?;
        let policies = lock(&self.state)
            .policies
            .iter()
            .take(limit as usize)
            .map(|p| p.summary.clone())
            .collect();
        self.respond("recent_policies", Ok(policies)).await
    }

    async fn policy_complete(&self, id: PolicyId) -> DeskResult<PolicyComplete> {
        self.enter("policy_complete")?;
        let policy = lock(&self.state)
            .policies
            .iter()
            .find(|p| p.summary.id == id)
            .cloned()
            .ok_or_else(|| not_found(format!("policy {}", id)));
        self.respond("policy_complete", policy).await
    }

    async fn carriers(&self) -> DeskResult<Vec<Carrier>> {
        self.enter("carriers")?;
        let carriers = lock(&self.state).carriers.clone();
        self.respond("carriers", Ok(carriers)).await
    }

    async fn dashboard_stats(&self) -> DeskResult<DashboardStats> {
        self.enter("dashboard_stats")?;
        let stats = lock(&self.state).stats.clone();
        self.respond("dashboard_stats", Ok(stats)).await
    }

    async fn processing_status(&self, job_id: &str) -> DeskResult<ProcessingStatusResponse> {
        self.enter("processing_status")?;
        let status = {
            let mut state = lock(&self.state);
            match state.jobs.get_mut(job_id) {
                Some(steps) => next_step(steps).unwrap_or_else(|| Ok(ProcessingStatus::Pending)),
                None => Err(not_found(format!("job {}", job_id))),
            }
        };
        let response = status.map(|status| ProcessingStatusResponse {
            job_id: job_id.to_string(),
            status,
            progress: None,
            message: None,
        });
        self.respond("processing_status", response).await
    }

    async fn update_policy_status(
        &self,
        id: PolicyId,
        status: PolicyStatus,
    ) -> DeskResult<PolicySummary> {
        self.enter("update_policy_status")?;
        let updated = {
            let mut state = lock(&self.state);
            match state.policies.iter_mut().find(|p| p.summary.id == id) {
                Some(policy) => {
                    policy.summary.status = status;
                    policy.summary.updated_at = Utc::now();
                    Ok(policy.summary.clone())
                }
                None => Err(not_found(format!("policy {}", id))),
            }
        };
        self.respond("update_policy_status", updated).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for POLICYDESK types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Keys following the `<resource>[-<qualifier>]*` convention.
    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        "[a-z]{1,8}(-[a-z0-9]{1,6}){0,3}"
    }

    /// Any JSON value the cache will accept (never `null`).
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,24}".prop_map(Value::from),
            prop::collection::vec(any::<i32>(), 0..6).prop_map(Value::from),
            ("[a-z]{1,8}", any::<u32>()).prop_map(|(k, v)| {
                let mut map = serde_json::Map::new();
                map.insert(k, Value::from(v));
                Value::Object(map)
            }),
        ]
    }

    pub fn arb_window_ms() -> impl Strategy<Value = u64> {
        1u64..3_600_000
    }

    pub fn arb_processing_status() -> impl Strategy<Value = ProcessingStatus> {
        prop_oneof![
            Just(ProcessingStatus::Pending),
            Just(ProcessingStatus::Uploading),
            Just(ProcessingStatus::Processing),
            Just(ProcessingStatus::Completed),
            Just(ProcessingStatus::NeedsReview),
            Just(ProcessingStatus::Failed),
        ]
    }

    pub fn arb_non_terminal_status() -> impl Strategy<Value = ProcessingStatus> {
        prop_oneof![
            Just(ProcessingStatus::Pending),
            Just(ProcessingStatus::Uploading),
            Just(ProcessingStatus::Processing),
        ]
    }

    pub fn arb_terminal_status() -> impl Strategy<Value = ProcessingStatus> {
        prop_oneof![
            Just(ProcessingStatus::Completed),
            Just(ProcessingStatus::NeedsReview),
            Just(ProcessingStatus::Failed),
        ]
    }

    /// Some non-terminal statuses followed by exactly one terminal status.
    pub fn arb_status_script() -> impl Strategy<Value = Vec<ProcessingStatus>> {
        (
            prop::collection::vec(arb_non_terminal_status(), 0..6),
            arb_terminal_status(),
        )
            .prop_map(|(mut script, terminal)| {
                script.push(terminal);
                script
            })
    }

    pub fn arb_policy_status() -> impl Strategy<Value = PolicyStatus> {
        prop_oneof![
            Just(PolicyStatus::Draft),
            Just(PolicyStatus::Active),
            Just(PolicyStatus::PendingReview),
            Just(PolicyStatus::Cancelled),
            Just(PolicyStatus::Expired),
        ]
    }

    pub fn arb_policy_summary() -> impl Strategy<Value = PolicySummary> {
        ("[A-Z]{2}-[0-9]{4}", "[A-Z][a-z]{2,10} [A-Z][a-z]{2,10}", arb_policy_status()).prop_map(
            |(number, insured, status)| PolicySummary {
                insured_name: insured,
                ..fixtures::policy_summary(&number, status)
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use policydesk_client::types::{Coverage, PolicyDocument};

    pub const CLIENT_CONFIG_TOML: &str = r#"
api_base_url = "http://127.0.0.1:9"
request_timeout_ms = 2000
log_format = "plain"

[auth]
api_key = "pk_test"

[cache]
short_ms = 300000
medium_ms = 600000
long_ms = 1800000
dedupe_in_flight = true

[poll]
interval_ms = 100
max_retries = 3
initial_backoff_ms = 10
max_backoff_ms = 40
multiplier = 2.0
"#;

    pub fn client_config() -> ClientConfig {
        match ClientConfig::from_toml(CLIENT_CONFIG_TOML) {
            Ok(config) => config,
            Err(err) => panic!("fixture config must parse: {}", err),
        }
    }

    /// 100ms polling, three retries with 10ms initial backoff.
    pub fn fast_poll_config() -> PollConfig {
        PollConfig::new(Duration::from_millis(100)).with_retry(RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            backoff_multiplier: 2.0,
        })
    }

    pub fn transport_failure(endpoint: &str) -> DeskError {
        TransportError::Unreachable {
            endpoint: endpoint.to_string(),
            reason: "connection refused".to_string(),
        }
        .into()
    }

    pub fn policy_summary(policy_number: &str, status: PolicyStatus) -> PolicySummary {
        PolicySummary {
            id: Uuid::now_v7(),
            policy_number: policy_number.to_string(),
            insured_name: "Dana Whitfield".to_string(),
            carrier_name: Some("Harbor Mutual".to_string()),
            status,
            effective_date: NaiveDate::from_ymd_opt(2026, 1, 1),
            expiration_date: NaiveDate::from_ymd_opt(2027, 1, 1),
            updated_at: Utc::now(),
        }
    }

    pub fn policy_complete(summary: PolicySummary) -> PolicyComplete {
        PolicyComplete {
            summary,
            premium: Some(1_240.0),
            coverages: vec![
                Coverage {
                    name: "Dwelling".to_string(),
                    limit: Some(350_000.0),
                    deductible: Some(1_000.0),
                },
                Coverage {
                    name: "Personal Liability".to_string(),
                    limit: Some(300_000.0),
                    deductible: None,
                },
            ],
            documents: vec![PolicyDocument {
                id: Uuid::now_v7(),
                file_name: "declarations.pdf".to_string(),
                processing_status: ProcessingStatus::Completed,
                uploaded_at: Utc::now(),
            }],
        }
    }

    pub fn carriers() -> Vec<Carrier> {
        vec![
            Carrier {
                id: Uuid::now_v7(),
                name: "Harbor Mutual".to_string(),
                naic_code: Some("12345".to_string()),
            },
            Carrier {
                id: Uuid::now_v7(),
                name: "Summit Casualty".to_string(),
                naic_code: None,
            },
        ]
    }

    pub fn dashboard_stats() -> DashboardStats {
        DashboardStats {
            total_policies: 3,
            active_policies: 2,
            pending_review: 1,
            processing_jobs: 0,
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for POLICYDESK results and watcher states.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &DeskResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &DeskResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    #[track_caller]
    pub fn assert_transport_error<T: std::fmt::Debug>(result: &DeskResult<T>) {
        match result {
            Err(DeskError::Transport(_)) => {}
            other => panic!("Expected Transport error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &DeskResult<T>) {
        match result {
            Err(DeskError::Remote(RemoteError::NotFound { .. })) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_timeout_error(error: Option<&DeskError>) {
        match error {
            Some(err) if err.is_timeout() => {}
            other => panic!("Expected timeout error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_terminal<S: JobStatus>(state: &WatchState<S>, expected: &S) {
        match state {
            WatchState::Terminal(status) if status == expected => {}
            other => panic!("Expected Terminal({:?}), got: {:?}", expected, other),
        }
    }

    #[track_caller]
    pub fn assert_watch_failed<S: JobStatus>(state: &WatchState<S>) {
        match state {
            WatchState::Failed { error, .. } => {
                assert!(
                    matches!(error, DeskError::Poll(_)),
                    "Expected poll error, got: {:?}",
                    error
                );
            }
            other => panic!("Expected Failed, got: {:?}", other),
        }
    }
}
