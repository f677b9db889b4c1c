//! REST client for the dashboard API.

use crate::config::{AuthConfig, ClientConfig};
use crate::error;
use crate::types::{
    Carrier, DashboardStats, PolicyComplete, PolicyId, PolicyStatus, PolicySummary,
    ProcessingStatusResponse, RecentPoliciesQuery, UpdatePolicyStatusRequest,
};
use async_trait::async_trait;
use policydesk_core::{ConfigError, DeskResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// Remote operations the dashboard needs.
#[async_trait]
pub trait PolicyApi: Send + Sync + 'static {
    async fn recent_policies(&self, limit: u32) -> DeskResult<Vec<PolicySummary>>;

    async fn policy_complete(&self, id: PolicyId) -> DeskResult<PolicyComplete>;

    async fn carriers(&self) -> DeskResult<Vec<Carrier>>;

    async fn dashboard_stats(&self) -> DeskResult<DashboardStats>;

    async fn processing_status(&self, job_id: &str) -> DeskResult<ProcessingStatusResponse>;

    async fn update_policy_status(
        &self,
        id: PolicyId,
        status: PolicyStatus,
    ) -> DeskResult<PolicySummary>;
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> DeskResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "request_timeout_ms".to_string(),
                reason: e.to_string(),
            })?;

        let auth_header = build_auth_headers(&config.auth)?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_json<T, Q>(&self, path: &str, query: Option<&Q>) -> DeskResult<T>
    where
        T: serde::de::DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(url).headers(self.auth_header.clone());
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request
            .send()
            .await
            .map_err(|e| error::unreachable(path, &e))?;
        self.parse_response(path, response).await
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> DeskResult<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(url)
            .headers(self.auth_header.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| error::unreachable(path, &e))?;
        self.parse_response(path, response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> DeskResult<T> {
        let status = response.status();
        debug!(path, status = status.as_u16(), "API response");
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| error::unreachable(path, &e))?;
            serde_json::from_slice::<T>(&bytes).map_err(|e| error::undecodable(path, e))
        } else {
            let text = response
                .text()
                .await
                .map_err(|e| error::unreachable(path, &e))?;
            Err(error::from_status(path, status.as_u16(), &text))
        }
    }
}

#[async_trait]
impl PolicyApi for RestClient {
    async fn recent_policies(&self, limit: u32) -> DeskResult<Vec<PolicySummary>> {
        self.get_json("/api/policies/recent", Some(&RecentPoliciesQuery { limit }))
            .await
    }

    async fn policy_complete(&self, id: PolicyId) -> DeskResult<PolicyComplete> {
        let path = format!("/api/policies/{}/complete", id);
        self.get_json::<PolicyComplete, ()>(&path, None).await
    }

    async fn carriers(&self) -> DeskResult<Vec<Carrier>> {
        self.get_json::<Vec<Carrier>, ()>("/api/carriers", None)
            .await
    }

    async fn dashboard_stats(&self) -> DeskResult<DashboardStats> {
        self.get_json::<DashboardStats, ()>("/api/dashboard/stats", None)
            .await
    }

    async fn processing_status(&self, job_id: &str) -> DeskResult<ProcessingStatusResponse> {
        let path = format!("/api/processing-status/{}", job_id);
        self.get_json::<ProcessingStatusResponse, ()>(&path, None)
            .await
    }

    async fn update_policy_status(
        &self,
        id: PolicyId,
        status: PolicyStatus,
    ) -> DeskResult<PolicySummary> {
        let path = format!("/api/policies/{}/status", id);
        self.post_json(&path, &UpdatePolicyStatusRequest { status })
            .await
    }
}

fn build_auth_headers(auth: &AuthConfig) -> DeskResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = &auth.api_key {
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(|e| invalid_header("auth.api_key", e))?,
        );
    }
    if let Some(token) = &auth.bearer_token {
        let value = format!("Bearer {}", token);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| invalid_header("auth.bearer_token", e))?,
        );
    }
    Ok(headers)
}

fn invalid_header(field: &str, err: impl ToString) -> policydesk_core::DeskError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: err.to_string(),
    }
    .into()
}
