//! POLICYDESK Client - REST access to the dashboard API
//!
//! [`RestClient`] talks to the API, [`PolicyService`] routes it through the
//! freshness cache, the operation state machine and the status watcher.
//! Configuration comes from a TOML file; see [`ClientConfig::load`].

pub mod api_client;
pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;
pub mod types;

pub use api_client::{PolicyApi, RestClient};
pub use config::{AuthConfig, CacheSettings, ClientConfig, LogFormat, PollSettings};
pub use error::ApiErrorBody;
pub use service::{DashboardSnapshot, PolicyService, ProcessingStatusSource};
pub use telemetry::init_tracing;
pub use types::{
    Carrier, Coverage, DashboardStats, PolicyComplete, PolicyDocument, PolicyId, PolicyStatus,
    PolicySummary, ProcessingStatusResponse,
};
