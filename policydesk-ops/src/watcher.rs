//! Poll-until-terminal status watcher.
//!
//! Fetches a job's status immediately on spawn, then on a fixed schedule of
//! one fetch per interval, until the status is terminal. A fetch that runs
//! longer than the interval delays the next tick instead of bunching them up. The first terminal status fires its notification
//! exactly once and ends the loop; no fetch is issued afterward.
//!
//! Failed fetches are retried with exponential backoff. After
//! `max_retries` consecutive failures the watcher gives up and reports
//! [`WatchState::Failed`]. Any successful fetch resets the count.
//!
//! The loop runs as a [`TimerHandle`] owned by the [`WatcherHandle`].
//! Dropping the handle retires the loop. Each status fetch runs as its own
//! task, so a fetch in flight at that moment completes but its result is
//! never applied.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use policydesk_core::{
    DeskError, DeskResult, JobStatus, NotificationSink, PollError, RetryConfig, TransportError,
    ValidationError,
};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::timer::TimerHandle;

/// Remote resource reporting a job's status.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    type Status: JobStatus;

    /// Identifier used in logs and error messages.
    fn job_id(&self) -> &str;

    async fn fetch_status(&self) -> DeskResult<Self::Status>;
}

/// Polling cadence and failure policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    pub retry: RetryConfig,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> DeskResult<()> {
        if self.interval.is_zero() {
            return Err(ValidationError::InvalidValue {
                field: "interval".to_string(),
                reason: "must be > 0".to_string(),
            }
            .into());
        }
        self.retry.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchState<S> {
    AwaitingFirstFetch,
    Polling(S),
    Terminal(S),
    /// Gave up after too many consecutive fetch failures.
    Failed { last: Option<S>, error: DeskError },
    /// Retired before reaching a terminal status.
    Stopped { last: Option<S> },
}

impl<S: Clone> WatchState<S> {
    /// No further state changes will follow.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Terminal(_) | Self::Failed { .. } | Self::Stopped { .. }
        )
    }

    /// Most recent status observed, if any.
    pub fn last_status(&self) -> Option<&S> {
        match self {
            Self::AwaitingFirstFetch => None,
            Self::Polling(status) | Self::Terminal(status) => Some(status),
            Self::Failed { last, .. } | Self::Stopped { last } => last.as_ref(),
        }
    }
}

/// Entry point for spawning watchers.
pub struct StatusWatcher;

impl StatusWatcher {
    /// Start watching `source`. Must be called within a Tokio runtime.
    pub fn spawn<Src: StatusSource>(
        source: Src,
        config: PollConfig,
        sink: Option<Arc<dyn NotificationSink>>,
    ) -> DeskResult<WatcherHandle<Src::Status>> {
        config.validate()?;
        let job = source.job_id().to_string();
        let (state_tx, _) = watch::channel(WatchState::AwaitingFirstFetch);
        let state = Arc::new(state_tx);
        let fetches = Arc::new(AtomicU32::new(0));

        let run = PollLoop {
            source: Arc::new(source),
            config,
            sink,
            state: Arc::clone(&state),
            fetches: Arc::clone(&fetches),
        };
        let task = TimerHandle::spawn(run.run()).ok_or_else(|| TransportError::Unreachable {
            endpoint: job.clone(),
            reason: "no async runtime to poll on".to_string(),
        })?;
        info!(job = %job, "Status watcher started");

        Ok(WatcherHandle {
            job,
            state,
            fetches,
            task: Some(task),
        })
    }
}

/// Owner of a running watcher.
pub struct WatcherHandle<S: JobStatus> {
    job: String,
    state: Arc<watch::Sender<WatchState<S>>>,
    fetches: Arc<AtomicU32>,
    task: Option<TimerHandle>,
}

impl<S: JobStatus> WatcherHandle<S> {
    pub fn job_id(&self) -> &str {
        &self.job
    }

    pub fn state(&self) -> WatchState<S> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WatchState<S>> {
        self.state.subscribe()
    }

    /// Status fetches issued so far.
    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Resolve once the watcher reaches a final state.
    pub async fn wait(&self) -> WatchState<S> {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(WatchState::is_final).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    /// Retire the loop now. Equivalent to dropping the handle.
    pub fn stop(mut self) {
        self.retire();
    }

    fn retire(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
        let stopped = self.state.send_if_modified(|state| {
            if state.is_final() {
                return false;
            }
            *state = WatchState::Stopped {
                last: state.last_status().cloned(),
            };
            true
        });
        if stopped {
            debug!(job = %self.job, "Status watcher stopped before a terminal status");
        }
    }
}

impl<S: JobStatus> Drop for WatcherHandle<S> {
    fn drop(&mut self) {
        self.retire();
    }
}

struct PollLoop<Src: StatusSource> {
    source: Arc<Src>,
    config: PollConfig,
    sink: Option<Arc<dyn NotificationSink>>,
    state: Arc<watch::Sender<WatchState<Src::Status>>>,
    fetches: Arc<AtomicU32>,
}

impl<Src: StatusSource> PollLoop<Src> {
    async fn run(self) {
        let job = self.source.job_id().to_string();
        let mut last: Option<Src::Status> = None;
        let mut failures = 0u32;
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // First tick completes immediately.
            ticker.tick().await;
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.fetch_once(&job).await {
                Ok(status) => {
                    failures = 0;
                    if status.is_terminal() {
                        self.finish(&job, last.as_ref(), status);
                        return;
                    }
                    if last.as_ref() != Some(&status) {
                        debug!(job = %job, status = ?status, "Job status changed");
                    }
                    last = Some(status.clone());
                    self.state.send_replace(WatchState::Polling(status));
                }
                Err(err) => {
                    failures += 1;
                    if failures > self.config.retry.max_retries {
                        self.give_up(&job, last, failures, &err);
                        return;
                    }
                    let backoff = self.config.retry.backoff_for(failures);
                    warn!(
                        job = %job,
                        attempt = failures,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Status fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    // Retry right after the backoff; the schedule restarts from there.
                    ticker.reset_immediately();
                }
            }
        }
    }

    /// The fetch runs detached; if this loop is retired meanwhile, the fetch
    /// still completes and its result is dropped.
    async fn fetch_once(&self, job: &str) -> DeskResult<Src::Status> {
        let source = Arc::clone(&self.source);
        let fetch = tokio::spawn(async move { source.fetch_status().await });
        match fetch.await {
            Ok(result) => result,
            Err(err) => Err(TransportError::Abandoned {
                key: format!("{}: {}", job, err),
            }
            .into()),
        }
    }

    fn finish(&self, job: &str, last: Option<&Src::Status>, status: Src::Status) {
        // Only a change into the terminal status notifies.
        if last != Some(&status) {
            info!(job = %job, status = ?status, "Job reached terminal status");
            if let (Some(sink), Some(note)) = (&self.sink, status.terminal_notification()) {
                sink.notify(note);
            }
        }
        self.state.send_replace(WatchState::Terminal(status));
    }

    fn give_up(&self, job: &str, last: Option<Src::Status>, attempts: u32, err: &DeskError) {
        let error = DeskError::from(PollError::RetriesExhausted {
            job: job.to_string(),
            attempts,
            last_error: err.to_string(),
        });
        warn!(job = %job, attempts, error = %err, "Giving up on status polling");
        if let Some(sink) = &self.sink {
            sink.notify(error.notification());
        }
        self.state.send_replace(WatchState::Failed { last, error });
    }
}
