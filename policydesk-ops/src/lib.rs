//! POLICYDESK Ops - lifecycle tracking for asynchronous work
//!
//! - [`AsyncOperation`]: idle/loading/success/error with an optional timeout
//!   and optimistic execution.
//! - [`StatusWatcher`]: polls a job's status until it is terminal.
//! - [`TimerHandle`]: the owned, cancellable task both of them run timers on.

pub mod operation;
pub mod optimistic;
pub mod timer;
pub mod watcher;

pub use operation::{AsyncOperation, OperationBuilder, OperationSnapshot, OperationStatus};
pub use optimistic::OptimisticState;
pub use timer::TimerHandle;
pub use watcher::{PollConfig, StatusSource, StatusWatcher, WatchState, WatcherHandle};
