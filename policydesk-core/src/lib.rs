//! POLICYDESK Core - shared types for the client-side data-access layer
//!
//! Error taxonomy, user notifications, job status vocabulary and upload
//! records. Everything here is plain data; the cache, the operation state
//! machine and the status watcher live in their own crates.

pub mod config;
pub mod error;
pub mod notification;
pub mod status;
pub mod upload;

pub use config::RetryConfig;
pub use error::{
    ConfigError, DeskError, DeskResult, PollError, RemoteError, TimeoutError, TransportError,
    ValidationError,
};
pub use notification::{
    ChannelSink, Notification, NotificationAction, NotificationLevel, NotificationSink,
};
pub use status::{JobStatus, ProcessingStatus};
pub use upload::{UploadFileRecord, UploadStatus};
