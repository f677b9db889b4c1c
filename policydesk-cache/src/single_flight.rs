//! In-flight request registry.
//!
//! Concurrent misses for the same cache key coalesce into one remote call.
//! The first caller becomes the leader and performs the fetch; later callers
//! subscribe and receive the leader's outcome, success or failure.
//!
//! ```text
//! fetch("k") ─┐
//!             │                            remote
//! fetch("k") ─┼──► SingleFlight ──leader──► call
//!             │        │                     │
//! fetch("k") ─┘        ▼                     ▼
//!                followers wait ◄──── broadcast outcome
//! ```
//!
//! If the leader is dropped before it finishes, its sender goes away with it
//! and every follower sees the channel close. Followers then re-contend and
//! one of them takes over.
//!
//! A flight remembers the cache epoch it started under. A caller arriving
//! after an invalidation does not join an older flight; it starts its own,
//! which replaces the old one in the registry. A forced refresh always
//! starts its own. The replaced leader still answers its existing
//! followers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use policydesk_core::DeskResult;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::freshness::CacheRead;

pub(crate) type SharedOutcome = DeskResult<CacheRead<Value>>;

pub(crate) enum Flight<'a> {
    /// No usable fetch in flight for this key; the caller must perform it
    /// and call [`FlightGuard::complete`].
    Leader(FlightGuard<'a>),
    /// Another caller is already fetching; wait on the receiver.
    Follower(broadcast::Receiver<SharedOutcome>),
}

struct InFlight {
    id: u64,
    epoch: u64,
    sender: broadcast::Sender<SharedOutcome>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    flights: HashMap<String, InFlight>,
}

#[derive(Default)]
pub(crate) struct SingleFlight {
    registry: Mutex<Registry>,
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Follow the flight for `key` if it started under `epoch` or later,
    /// otherwise lead a new one.
    pub(crate) fn join(&self, key: &str, epoch: u64) -> Flight<'_> {
        let mut registry = self.lock();
        match registry.flights.get(key) {
            Some(flight) if flight.epoch >= epoch => {
                debug!(key, "Joining in-flight fetch");
                return Flight::Follower(flight.sender.subscribe());
            }
            Some(_) => debug!(key, "In-flight fetch predates an invalidation, not joining"),
            None => {}
        }
        Flight::Leader(self.start(&mut registry, key, epoch))
    }

    /// Lead a new flight for `key`, replacing any flight already registered.
    pub(crate) fn lead(&self, key: &str, epoch: u64) -> FlightGuard<'_> {
        let mut registry = self.lock();
        self.start(&mut registry, key, epoch)
    }

    fn start(&self, registry: &mut Registry, key: &str, epoch: u64) -> FlightGuard<'_> {
        registry.next_id += 1;
        let id = registry.next_id;
        // One outcome per flight, so a single slot is enough.
        let (sender, _receiver) = broadcast::channel(1);
        let replaced = registry.flights.insert(
            key.to_string(),
            InFlight {
                id,
                epoch,
                sender: sender.clone(),
            },
        );
        if replaced.is_some() {
            debug!(key, "Replaced in-flight fetch with a new leader");
        }
        FlightGuard {
            registry: self,
            key: key.to_string(),
            id,
            sender: Some(sender),
        }
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.lock().flights.len()
    }
}

/// Leadership of one in-flight fetch. Dropping it without completing
/// releases the key and closes the channel for followers.
pub(crate) struct FlightGuard<'a> {
    registry: &'a SingleFlight,
    key: String,
    id: u64,
    sender: Option<broadcast::Sender<SharedOutcome>>,
}

impl FlightGuard<'_> {
    pub(crate) fn complete(mut self, outcome: SharedOutcome) {
        self.release();
        if let Some(sender) = self.sender.take() {
            let waiters = sender.receiver_count();
            // No receivers is fine: nobody joined this flight.
            let _ = sender.send(outcome);
            if waiters > 0 {
                debug!(key = %self.key, waiters, "Fanned out in-flight result");
            }
        }
    }

    /// Unregister this flight, unless a newer one has taken the key.
    fn release(&self) {
        let mut registry = self.registry.lock();
        if registry
            .flights
            .get(&self.key)
            .is_some_and(|flight| flight.id == self.id)
        {
            registry.flights.remove(&self.key);
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.sender.take().is_some() {
            self.release();
            debug!(key = %self.key, "In-flight fetch abandoned by its leader");
        }
    }
}
