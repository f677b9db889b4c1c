//! Cache key conventions.
//!
//! Keys are plain strings of the form `<resource>[-<qualifier>]*`. Lookups
//! compare them exactly; bulk invalidation matches substrings, so a resource
//! prefix or an entity id can be targeted without a key index.

use std::fmt;

/// Resource namespaces used by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Policy,
    PolicyComplete,
    RecentPolicies,
    DashboardStats,
    Carriers,
    ProcessingStatus,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::PolicyComplete => "policy-complete",
            Self::RecentPolicies => "recent-policies",
            Self::DashboardStats => "dashboard-stats",
            Self::Carriers => "carriers",
            Self::ProcessingStatus => "processing-status",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cache key. Same logical request, same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(kind: ResourceKind) -> Self {
        Self(kind.as_str().to_string())
    }

    /// Wrap a caller-built key verbatim.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Append a qualifier (entity id, page size, filter value...).
    pub fn with(mut self, qualifier: impl fmt::Display) -> Self {
        self.0.push('-');
        self.0.push_str(&qualifier.to_string());
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `policy-complete-<id>`
    pub fn policy_complete(policy_id: impl fmt::Display) -> Self {
        Self::new(ResourceKind::PolicyComplete).with(policy_id)
    }

    /// `recent-policies-<limit>`
    pub fn recent_policies(limit: u32) -> Self {
        Self::new(ResourceKind::RecentPolicies).with(limit)
    }

    pub fn dashboard_stats() -> Self {
        Self::new(ResourceKind::DashboardStats)
    }

    pub fn carriers() -> Self {
        Self::new(ResourceKind::Carriers)
    }

    /// `processing-status-<job>`
    pub fn processing_status(job_id: impl fmt::Display) -> Self {
        Self::new(ResourceKind::ProcessingStatus).with(job_id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rendering() {
        assert_eq!(CacheKey::policy_complete(42).as_str(), "policy-complete-42");
        assert_eq!(CacheKey::recent_policies(10).as_str(), "recent-policies-10");
        assert_eq!(CacheKey::carriers().as_str(), "carriers");
        assert_eq!(
            CacheKey::new(ResourceKind::Policy).with(7).with("detail").as_str(),
            "policy-7-detail"
        );
    }

    #[test]
    fn test_same_request_same_key() {
        assert_eq!(CacheKey::recent_policies(5), CacheKey::recent_policies(5));
        assert_ne!(CacheKey::recent_policies(5), CacheKey::recent_policies(50));
    }

    #[test]
    fn test_resource_prefix_is_substring() {
        let key = CacheKey::processing_status("job-9");
        assert!(key.as_str().contains(ResourceKind::ProcessingStatus.as_str()));
        assert!(key.as_str().contains("job-9"));
    }
}
