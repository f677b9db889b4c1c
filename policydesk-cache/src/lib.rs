//! POLICYDESK Cache - freshness cache and cache-aware fetching
//!
//! [`FreshnessCache`] stores values with a capture time and a freshness
//! window and evicts lazily. [`FetchOrchestrator`] layers remote calls on
//! top: fresh hits skip the network, misses populate the cache, failures
//! fall back to the last known value when there is one.

pub mod freshness;
pub mod keys;
pub mod orchestrator;
mod single_flight;
pub mod store;
pub mod traits;

pub use freshness::{CacheRead, FreshnessWindow, FreshnessWindows, ReadSource};
pub use keys::{CacheKey, ResourceKind};
pub use orchestrator::{BatchRequest, CacheConfig, FetchOrchestrator};
pub use store::FreshnessCache;
pub use traits::{CacheStats, CacheableValue};
