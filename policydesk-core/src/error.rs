//! Error types for POLICYDESK operations

use crate::notification::{Notification, NotificationAction, NotificationLevel};
use std::time::Duration;
use thiserror::Error;

/// No usable response was obtained from the remote side.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {endpoint} failed: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("Failed to decode response for {context}: {reason}")]
    Decode { context: String, reason: String },

    #[error("In-flight request for {key} was abandoned")]
    Abandoned { key: String },
}

/// The remote side answered with a well-formed error response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote returned status {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },
}

/// Failures synthesized locally because nothing settled in time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("Operation timed out after {after:?}")]
    OperationTimedOut { after: Duration },
}

/// Caller-supplied data rejected before any remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Freshness window must be a positive duration, got {window:?}")]
    InvalidFreshnessWindow { window: Duration },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or POLICYDESK_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Status polling errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("Status polling for {job} gave up after {attempts} consecutive failures: {last_error}")]
    RetriesExhausted {
        job: String,
        attempts: u32,
        last_error: String,
    },
}

/// Master error type for all POLICYDESK errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeskError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Poll error: {0}")]
    Poll(#[from] PollError),
}

impl DeskError {
    /// Whether the failure came from the remote boundary.
    ///
    /// These are the failures the fetch orchestrator may paper over with a
    /// stale cache entry. Timeouts, validation and config errors never are.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Remote(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Recovery action offered alongside this error.
    pub fn recovery_action(&self) -> NotificationAction {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::Poll(_) => NotificationAction::Retry,
            Self::Remote(RemoteError::NotFound { .. }) => NotificationAction::NavigateAway,
            Self::Remote(_) => NotificationAction::Retry,
            Self::Validation(_) | Self::Config(_) => NotificationAction::Dismiss,
        }
    }

    /// Short user-facing message plus recovery action.
    pub fn notification(&self) -> Notification {
        let message = match self {
            Self::Transport(_) => "Could not reach the server".to_string(),
            Self::Remote(RemoteError::NotFound { resource }) => {
                format!("{} no longer exists", resource)
            }
            Self::Remote(RemoteError::Status { message, .. }) => message.clone(),
            Self::Timeout(_) => "The request took too long".to_string(),
            Self::Validation(err) => err.to_string(),
            Self::Config(err) => err.to_string(),
            Self::Poll(_) => "Lost track of document processing".to_string(),
        };
        Notification::new(NotificationLevel::Error, message).with_action(self.recovery_action())
    }
}

/// Result type alias for POLICYDESK operations.
pub type DeskResult<T> = Result<T, DeskError>;

// =============================================================================
// TESTS
// =============================================================================
