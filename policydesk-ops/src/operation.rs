//! Four-state lifecycle for any asynchronous unit of work.
//!
//! ```text
//!          set_loading / execute
//!   Idle ─────────────────────────► Loading ──► Success
//!     ▲                                │  │
//!     └──────── set_idle ──────────────┘  └──► Error  (set_error, failure, timeout)
//! ```
//!
//! Transitions are caller-driven. `set_loading` bumps a generation counter
//! and arms the optional timeout; every other transition disarms it first.
//! A timer or an in-flight result tagged with an older generation is
//! discarded, so nothing late can overwrite a settled state or push it back
//! to `Loading`.
//!
//! Watch subscribers receive each snapshot while the state lock is still
//! held, so they see transitions in the order they happened. Callbacks run
//! after the lock is released; a state-change callback that has already
//! been overtaken by a newer transition is skipped.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use policydesk_core::{DeskError, DeskResult, TimeoutError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::optimistic::OptimisticState;
use crate::timer::TimerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an observer can see about an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSnapshot<T> {
    pub status: OperationStatus,
    pub error: Option<DeskError>,
    pub value: OptimisticState<T>,
}

impl<T> Default for OperationSnapshot<T> {
    fn default() -> Self {
        Self {
            status: OperationStatus::Idle,
            error: None,
            value: OptimisticState::Idle,
        }
    }
}

type StatusCallback = Box<dyn Fn(OperationStatus) + Send + Sync>;
type TimeoutCallback = Box<dyn Fn() + Send + Sync>;
type SuccessCallback<T> = Box<dyn Fn(&T) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&DeskError) + Send + Sync>;

struct Callbacks<T> {
    on_state_change: Option<StatusCallback>,
    on_timeout: Option<TimeoutCallback>,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

struct State<T> {
    snapshot: OperationSnapshot<T>,
    generation: u64,
    /// Bumped on every published transition.
    revision: u64,
    timer: Option<TimerHandle>,
}

type Published = (OperationStatus, u64);

struct Shared<T> {
    name: String,
    timeout: Option<Duration>,
    state: Mutex<State<T>>,
    observers: watch::Sender<OperationSnapshot<T>>,
    announced: AtomicU64,
    callbacks: Callbacks<T>,
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand the current snapshot to subscribers. Called with the lock held.
    fn commit(&self, state: &mut State<T>) -> Published {
        state.revision += 1;
        self.observers.send_replace(state.snapshot.clone());
        (state.snapshot.status, state.revision)
    }

    /// Run the state-change callback for a committed transition. Called
    /// after the lock is released.
    fn announce(&self, (status, revision): Published) {
        if self.announced.fetch_max(revision, Ordering::SeqCst) >= revision {
            debug!(operation = %self.name, revision, "Skipping overtaken state change");
            return;
        }
        if let Some(callback) = &self.callbacks.on_state_change {
            callback(status);
        }
    }

    fn time_out(&self, generation: u64) {
        let Some(after) = self.timeout else {
            return;
        };
        let published = {
            let mut state = self.lock();
            if state.generation != generation || state.snapshot.status != OperationStatus::Loading
            {
                return;
            }
            if let Some(timer) = state.timer.take() {
                timer.detach();
            }
            let err = DeskError::from(TimeoutError::OperationTimedOut { after });
            state.snapshot.value.roll_back(&err);
            state.snapshot.status = OperationStatus::Error;
            state.snapshot.error = Some(err);
            self.commit(&mut state)
        };
        warn!(
            operation = %self.name,
            timeout_ms = after.as_millis() as u64,
            "Operation timed out"
        );
        self.announce(published);
        if let Some(callback) = &self.callbacks.on_timeout {
            callback();
        }
    }
}

/// Builder for [`AsyncOperation`].
pub struct OperationBuilder<T> {
    name: String,
    timeout: Option<Duration>,
    callbacks: Callbacks<T>,
}

impl<T: Clone + Send + Sync + 'static> OperationBuilder<T> {
    /// Name used in log output.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Force `Error` if a `Loading` state is not left within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Called on every transition, the forced timeout included.
    pub fn on_state_change(mut self, callback: impl Fn(OperationStatus) + Send + Sync + 'static) -> Self {
        self.callbacks.on_state_change = Some(Box::new(callback));
        self
    }

    pub fn on_timeout(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks.on_timeout = Some(Box::new(callback));
        self
    }

    /// Called when [`AsyncOperation::execute`] applies a successful result.
    pub fn on_success(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.callbacks.on_success = Some(Box::new(callback));
        self
    }

    /// Called when [`AsyncOperation::execute`] applies a failure.
    pub fn on_error(mut self, callback: impl Fn(&DeskError) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> AsyncOperation<T> {
        let (observers, _) = watch::channel(OperationSnapshot::default());
        AsyncOperation {
            shared: Arc::new(Shared {
                name: self.name,
                timeout: self.timeout,
                state: Mutex::new(State {
                    snapshot: OperationSnapshot::default(),
                    generation: 0,
                    revision: 0,
                    timer: None,
                }),
                observers,
                announced: AtomicU64::new(0),
                callbacks: self.callbacks,
            }),
        }
    }
}

/// Loading/success/error tracking around one call site.
///
/// Clones share state. Dropping the last clone cancels a pending timeout.
pub struct AsyncOperation<T = ()> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for AsyncOperation<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for AsyncOperation<T> {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<T: Clone + Send + Sync + 'static> AsyncOperation<T> {
    pub fn builder() -> OperationBuilder<T> {
        OperationBuilder {
            name: "operation".to_string(),
            timeout: None,
            callbacks: Callbacks {
                on_state_change: None,
                on_timeout: None,
                on_success: None,
                on_error: None,
            },
        }
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::builder().with_timeout(timeout).build()
    }

    pub fn set_loading(&self) {
        self.enter_loading(None);
    }

    pub fn set_success(&self) {
        self.transition(None, |snapshot| {
            snapshot.status = OperationStatus::Success;
            snapshot.error = None;
        });
    }

    /// Record `err`. An unconfirmed optimistic value is rolled back.
    pub fn set_error(&self, err: DeskError) {
        self.transition(None, move |snapshot| {
            snapshot.value.roll_back(&err);
            snapshot.status = OperationStatus::Error;
            snapshot.error = Some(err);
        });
    }

    /// Reset to the initial state.
    pub fn set_idle(&self) {
        self.transition(None, |snapshot| *snapshot = OperationSnapshot::default());
    }

    /// Run `operation` through the lifecycle.
    ///
    /// `optimistic` is published as the current value until the real result
    /// arrives. A failure rolls it back. If the operation was superseded in
    /// the meantime (timed out, reset, or another `execute` started) the
    /// result is not applied, but it is still returned.
    pub async fn execute<Fut>(&self, operation: Fut, optimistic: Option<T>) -> DeskResult<T>
    where
        Fut: Future<Output = DeskResult<T>>,
    {
        let generation = self.enter_loading(Some(optimistic));
        let result = operation.await;

        let applied = match &result {
            Ok(value) => {
                let applied = self.transition(Some(generation), |snapshot| {
                    snapshot.status = OperationStatus::Success;
                    snapshot.error = None;
                    snapshot.value = OptimisticState::Settled(value.clone());
                });
                if applied {
                    if let Some(callback) = &self.shared.callbacks.on_success {
                        callback(value);
                    }
                }
                applied
            }
            Err(err) => {
                let applied = self.transition(Some(generation), |snapshot| {
                    snapshot.status = OperationStatus::Error;
                    snapshot.error = Some(err.clone());
                    snapshot.value = OptimisticState::Failed(err.clone());
                });
                if applied {
                    if let Some(callback) = &self.shared.callbacks.on_error {
                        callback(err);
                    }
                }
                applied
            }
        };
        if !applied {
            debug!(
                operation = %self.shared.name,
                generation,
                "Discarding result of superseded operation"
            );
        }
        result
    }

    pub fn status(&self) -> OperationStatus {
        self.shared.lock().snapshot.status
    }

    pub fn is_loading(&self) -> bool {
        self.status() == OperationStatus::Loading
    }

    pub fn error(&self) -> Option<DeskError> {
        self.shared.lock().snapshot.error.clone()
    }

    pub fn value(&self) -> OptimisticState<T> {
        self.shared.lock().snapshot.value.clone()
    }

    /// Best-known value; see [`OptimisticState::current`].
    pub fn current(&self) -> Option<T> {
        self.shared.lock().snapshot.value.current().cloned()
    }

    pub fn snapshot(&self) -> OperationSnapshot<T> {
        self.shared.lock().snapshot.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OperationSnapshot<T>> {
        self.shared.observers.subscribe()
    }

    fn enter_loading(&self, pending: Option<Option<T>>) -> u64 {
        let (published, generation) = {
            let mut state = self.shared.lock();
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.generation += 1;
            let generation = state.generation;
            state.snapshot.status = OperationStatus::Loading;
            state.snapshot.error = None;
            if let Some(optimistic) = pending {
                state.snapshot.value = OptimisticState::Pending { optimistic };
            }
            state.timer = self.arm(generation);
            (self.shared.commit(&mut state), generation)
        };
        debug!(operation = %self.shared.name, generation, "Operation loading");
        self.shared.announce(published);
        generation
    }

    fn arm(&self, generation: u64) -> Option<TimerHandle> {
        let timeout = self.shared.timeout?;
        // The timer must not keep the operation alive.
        let shared = Arc::downgrade(&self.shared);
        let timer = TimerHandle::after(timeout, move || {
            if let Some(shared) = shared.upgrade() {
                shared.time_out(generation);
            }
        });
        if timer.is_none() {
            warn!(
                operation = %self.shared.name,
                "No async runtime available, timeout not armed"
            );
        }
        timer
    }

    /// Apply `update` after disarming the timer. With `generation`, only if
    /// that generation is still current and loading.
    fn transition(
        &self,
        generation: Option<u64>,
        update: impl FnOnce(&mut OperationSnapshot<T>),
    ) -> bool {
        let published = {
            let mut state = self.shared.lock();
            if let Some(generation) = generation {
                if state.generation != generation
                    || state.snapshot.status != OperationStatus::Loading
                {
                    return false;
                }
            }
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            update(&mut state.snapshot);
            self.shared.commit(&mut state)
        };
        self.shared.announce(published);
        true
    }
}
