//! Request and response bodies of the dashboard API.

use chrono::{DateTime, NaiveDate, Utc};
use policydesk_core::ProcessingStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PolicyId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Draft,
    Active,
    PendingReview,
    Cancelled,
    Expired,
}

impl PolicyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::PendingReview => "pending_review",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of the recent-policies list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySummary {
    pub id: PolicyId,
    pub policy_number: String,
    pub insured_name: String,
    pub carrier_name: Option<String>,
    pub status: PolicyStatus,
    pub effective_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub name: String,
    pub limit: Option<f64>,
    pub deductible: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub id: Uuid,
    pub file_name: String,
    pub processing_status: ProcessingStatus,
    pub uploaded_at: DateTime<Utc>,
}

/// Policy detail with everything extracted from its documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyComplete {
    #[serde(flatten)]
    pub summary: PolicySummary,
    pub premium: Option<f64>,
    #[serde(default)]
    pub coverages: Vec<Coverage>,
    #[serde(default)]
    pub documents: Vec<PolicyDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Carrier {
    pub id: Uuid,
    pub name: String,
    pub naic_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_policies: u64,
    pub active_policies: u64,
    pub pending_review: u64,
    pub processing_jobs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatusResponse {
    pub job_id: String,
    pub status: ProcessingStatus,
    pub progress: Option<u8>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePolicyStatusRequest {
    pub status: PolicyStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentPoliciesQuery {
    pub limit: u32,
}
