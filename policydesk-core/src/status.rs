//! Job status vocabulary for long-running server-side work.

use crate::notification::{Notification, NotificationAction};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A status value reported by a remote job.
///
/// The status watcher only needs to know which values are terminal and what,
/// if anything, to tell the user when a terminal value is first seen.
pub trait JobStatus: Clone + PartialEq + Debug + Send + Sync + 'static {
    fn is_terminal(&self) -> bool;

    /// One-shot notification for a terminal status.
    fn terminal_notification(&self) -> Option<Notification> {
        None
    }
}

/// Processing status of an uploaded policy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Uploading,
    Processing,
    Completed,
    /// Extraction finished but some fields need human review.
    NeedsReview,
    #[serde(alias = "error")]
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::NeedsReview => "needs_review",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JobStatus for ProcessingStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::NeedsReview | Self::Failed)
    }

    fn terminal_notification(&self) -> Option<Notification> {
        match self {
            Self::Completed => Some(Notification::success("Document processed successfully")),
            Self::NeedsReview => Some(Notification::warning(
                "Document processed, some fields need review",
            )),
            Self::Failed => Some(
                Notification::error("Document processing failed")
                    .with_action(NotificationAction::Retry),
            ),
            Self::Pending | Self::Uploading | Self::Processing => None,
        }
    }
}
