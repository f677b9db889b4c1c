//! Freshness windows and cache read metadata.
//!
//! A freshness window is how long a cached value may be served without
//! asking the remote side again. Reads come back as [`CacheRead<T>`], which
//! says where the value came from so callers can tell a degraded answer from
//! a fresh one.

use policydesk_core::{DeskResult, ValidationError};
use std::time::Duration;
use tokio::time::Instant;

/// A strictly positive freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FreshnessWindow(Duration);

impl FreshnessWindow {
    /// Volatile aggregate views (recent policies, dashboard stats).
    pub const SHORT: Self = Self(Duration::from_secs(5 * 60));
    /// Single-entity detail views.
    pub const MEDIUM: Self = Self(Duration::from_secs(10 * 60));
    /// Rarely-changing reference data such as carrier lists.
    pub const LONG: Self = Self(Duration::from_secs(30 * 60));

    pub fn new(window: Duration) -> DeskResult<Self> {
        if window.is_zero() {
            return Err(ValidationError::InvalidFreshnessWindow { window }.into());
        }
        Ok(Self(window))
    }

    pub fn from_millis(millis: u64) -> DeskResult<Self> {
        Self::new(Duration::from_millis(millis))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl Default for FreshnessWindow {
    fn default() -> Self {
        Self::SHORT
    }
}

/// The three window tiers used by the dashboard resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessWindows {
    pub short: FreshnessWindow,
    pub medium: FreshnessWindow,
    pub long: FreshnessWindow,
}

impl Default for FreshnessWindows {
    fn default() -> Self {
        Self {
            short: FreshnessWindow::SHORT,
            medium: FreshnessWindow::MEDIUM,
            long: FreshnessWindow::LONG,
        }
    }
}

/// Where a value handed back by the orchestrator came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Fresh cache hit, no remote call made.
    Cache,
    /// Fetched from the remote side just now.
    Remote,
    /// The remote call failed and an expired entry was served instead.
    StaleFallback,
}

/// Result of a cache-aware read, carrying provenance metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    /// When the value was captured from the remote side.
    cached_at: Instant,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T, cached_at: Instant) -> Self {
        Self {
            value,
            cached_at,
            source: ReadSource::Cache,
        }
    }

    pub fn from_remote(value: T) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
            source: ReadSource::Remote,
        }
    }

    pub fn stale_fallback(value: T, cached_at: Instant) -> Self {
        Self {
            value,
            cached_at,
            source: ReadSource::StaleFallback,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn cached_at(&self) -> Instant {
        self.cached_at
    }

    /// Time since the value was captured.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.cached_at)
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    /// True when the value is a last-known-good copy served after a failure.
    pub fn is_degraded(&self) -> bool {
        self.source == ReadSource::StaleFallback
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            source: self.source,
        }
    }

    pub fn try_map<U, E, F>(self, f: F) -> Result<CacheRead<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(CacheRead {
            value: f(self.value)?,
            cached_at: self.cached_at,
            source: self.source,
        })
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
