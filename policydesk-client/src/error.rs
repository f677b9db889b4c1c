//! Mapping from HTTP outcomes into the POLICYDESK error taxonomy.

use policydesk_core::{DeskError, RemoteError, TransportError};
use serde::Deserialize;

/// Error body returned by the API, when it returns one.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: Option<String>,
    pub message: String,
}

/// No response obtained for `endpoint`.
pub(crate) fn unreachable(endpoint: &str, err: &reqwest::Error) -> DeskError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    TransportError::Unreachable {
        endpoint: endpoint.to_string(),
        reason,
    }
    .into()
}

pub(crate) fn undecodable(endpoint: &str, reason: impl ToString) -> DeskError {
    TransportError::Decode {
        context: endpoint.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Classify a non-2xx response.
pub(crate) fn from_status(endpoint: &str, status: u16, body: &str) -> DeskError {
    if status == 404 {
        return RemoteError::NotFound {
            resource: endpoint.to_string(),
        }
        .into();
    }
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => RemoteError::Status {
            status,
            code: parsed.code,
            message: parsed.message,
        },
        Err(_) => RemoteError::Status {
            status,
            code: None,
            message: if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                body.trim().to_string()
            },
        },
    }
    .into()
}
