//! In-memory freshness cache.
//!
//! Entries carry the instant they were captured and their own freshness
//! window. Eviction is lazy: a stale entry is dropped the next time `get` or
//! `has` looks at it, or when a caller asks for an explicit sweep with
//! [`FreshnessCache::clear_expired`]. There is no background task.
//!
//! Writes coming back from a remote call carry a [`WriteTicket`] taken
//! before the call started. Such a write is refused if the cache was
//! invalidated in the meantime, or if the key already holds a value written
//! after the ticket was issued.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::freshness::FreshnessWindow;
use crate::traits::{CacheStats, CacheableValue};

/// A single cached value. Never handed out by reference.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    captured_at: Instant,
    window: FreshnessWindow,
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_fresh_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.captured_at) <= self.window.as_duration()
    }
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    stats: CacheStats,
    /// Bumped by every invalidation.
    epoch: u64,
    next_seq: u64,
}

impl<V> Inner<V> {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Position in the cache's write order, taken before a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WriteTicket {
    pub(crate) epoch: u64,
    seq: u64,
}

/// Keyed store answering "is there a still-fresh value for K" and
/// "give me whatever I have for K".
///
/// One instance per application session, shared behind an `Arc`. The lock is
/// never held across an await point.
pub struct FreshnessCache<V: CacheableValue = Value> {
    inner: Mutex<Inner<V>>,
    default_window: FreshnessWindow,
}

impl<V: CacheableValue> FreshnessCache<V> {
    pub fn new(default_window: FreshnessWindow) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
                epoch: 0,
                next_seq: 0,
            }),
            default_window,
        }
    }

    pub fn default_window(&self) -> FreshnessWindow {
        self.default_window
    }

    // A panic while holding the lock cannot leave an entry half-written, so
    // a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` captured now. Absent values are not cached.
    ///
    /// Returns whether the value was stored.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: V,
        window: Option<FreshnessWindow>,
    ) -> bool {
        let key = key.into();
        if value.is_absent() {
            debug!(key = %key, "Refusing to cache absent value");
            return false;
        }
        let mut inner = self.lock();
        let seq = inner.next_seq();
        self.insert(&mut inner, key, value, window, seq);
        true
    }

    pub(crate) fn ticket(&self) -> WriteTicket {
        let mut inner = self.lock();
        WriteTicket {
            epoch: inner.epoch,
            seq: inner.next_seq(),
        }
    }

    /// [`FreshnessCache::set`] for a value fetched under `ticket`.
    pub(crate) fn set_with_ticket(
        &self,
        key: &str,
        value: V,
        window: Option<FreshnessWindow>,
        ticket: WriteTicket,
    ) -> bool {
        if value.is_absent() {
            debug!(key, "Refusing to cache absent value");
            return false;
        }
        let mut inner = self.lock();
        if inner.epoch != ticket.epoch {
            debug!(key, "Cache invalidated during fetch, result not stored");
            return false;
        }
        if inner
            .entries
            .get(key)
            .is_some_and(|entry| entry.seq > ticket.seq)
        {
            debug!(key, "Newer value already cached, result not stored");
            return false;
        }
        self.insert(&mut inner, key.to_string(), value, window, ticket.seq);
        true
    }

    fn insert(
        &self,
        inner: &mut Inner<V>,
        key: String,
        value: V,
        window: Option<FreshnessWindow>,
        seq: u64,
    ) {
        let entry = CacheEntry {
            value,
            captured_at: Instant::now(),
            window: window.unwrap_or(self.default_window),
            seq,
        };
        inner.entries.insert(key, entry);
        inner.stats.entry_count = inner.entries.len() as u64;
    }

    /// Fresh value for `key`, evicting the entry if it has gone stale.
    pub fn get(&self, key: impl AsRef<str>) -> Option<V> {
        self.lookup(key.as_ref(), true).map(|(value, _)| value)
    }

    /// Fresh value and capture time. A stale entry counts as a miss but is
    /// kept, so the orchestrator can still fall back to it.
    pub(crate) fn get_fresh_entry(&self, key: &str) -> Option<(V, Instant)> {
        self.lookup(key, false)
    }

    fn lookup(&self, key: &str, evict_stale: bool) -> Option<(V, Instant)> {
        let now = Instant::now();
        let mut inner = self.lock();
        let inner = &mut *inner;
        match inner.entries.get(key).map(|entry| entry.is_fresh_at(now)) {
            Some(true) => {
                inner.stats.hits += 1;
                inner
                    .entries
                    .get(key)
                    .map(|entry| (entry.value.clone(), entry.captured_at))
            }
            Some(false) if !evict_stale => {
                inner.stats.misses += 1;
                None
            }
            Some(false) => {
                inner.entries.remove(key);
                inner.stats.evictions += 1;
                inner.stats.misses += 1;
                inner.stats.entry_count = inner.entries.len() as u64;
                debug!(key, "Evicted stale cache entry on lookup");
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Same freshness check and eviction as [`FreshnessCache::get`], without
    /// cloning the value.
    pub fn has(&self, key: impl AsRef<str>) -> bool {
        let key = key.as_ref();
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.entries.get(key).map(|entry| entry.is_fresh_at(now)) {
            Some(true) => true,
            Some(false) => {
                inner.entries.remove(key);
                inner.stats.evictions += 1;
                inner.stats.entry_count = inner.entries.len() as u64;
                debug!(key, "Evicted stale cache entry on has()");
                false
            }
            None => false,
        }
    }

    /// Whatever is stored for `key`, fresh or not. Does not evict.
    pub fn get_stale(&self, key: impl AsRef<str>) -> Option<V> {
        self.get_stale_entry(key.as_ref()).map(|(value, _)| value)
    }

    pub(crate) fn get_stale_entry(&self, key: &str) -> Option<(V, Instant)> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| (entry.value.clone(), entry.captured_at))
    }

    /// Without a pattern, clear everything; with one, delete every key that
    /// contains it. Returns the number of entries removed.
    ///
    /// Fetches already in flight will not write their results back.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        match pattern {
            None => inner.entries.clear(),
            Some(pattern) => inner.entries.retain(|key, _| !key.contains(pattern)),
        }
        let removed = before - inner.entries.len();
        inner.stats.entry_count = inner.entries.len() as u64;
        inner.epoch += 1;
        debug!(pattern = ?pattern, removed, "Invalidated cache entries");
        removed
    }

    /// Sweep out every entry that is stale right now.
    pub fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.is_fresh_at(now));
        let removed = before - inner.entries.len();
        inner.stats.evictions += removed as u64;
        inner.stats.entry_count = inner.entries.len() as u64;
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }

    pub(crate) fn record_stale_fallback(&self) {
        self.lock().stats.stale_fallbacks += 1;
    }

    pub(crate) fn record_coalesced(&self) {
        self.lock().stats.coalesced += 1;
    }
}

impl<V: CacheableValue> Default for FreshnessCache<V> {
    fn default() -> Self {
        Self::new(FreshnessWindow::default())
    }
}
