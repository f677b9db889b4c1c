//! Per-file projection of remote upload and processing state.
//!
//! Records only move forward: the status rank and the progress percentage are
//! both monotone, and `completed` / `error` are final.

use crate::status::ProcessingStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Processing,
    Completed,
    Error,
}

impl UploadStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Uploading => 1,
            Self::Processing => 2,
            Self::Completed | Self::Error => 3,
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadFileRecord {
    pub id: Uuid,
    pub file_name: String,
    pub status: UploadStatus,
    /// Percentage, 0 to 100.
    pub progress: u8,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl UploadFileRecord {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            file_name: file_name.into(),
            status: UploadStatus::Pending,
            progress: 0,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Move the record forward.
    ///
    /// Returns `false` (and leaves the record untouched) when the update would
    /// regress the status or the record is already final. Progress never
    /// decreases; `completed` pins it at 100.
    pub fn advance(&mut self, status: UploadStatus, progress: u8) -> bool {
        if self.status.is_final() || status.rank() < self.status.rank() {
            return false;
        }
        let progress = if status == UploadStatus::Completed {
            100
        } else {
            progress.min(100)
        };
        self.status = status;
        self.progress = self.progress.max(progress);
        self.updated_at = Utc::now();
        true
    }

    /// Mark the record failed, unless it already reached a final state.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.status.is_final() {
            return false;
        }
        self.status = UploadStatus::Error;
        self.error = Some(reason.into());
        self.updated_at = Utc::now();
        true
    }

    /// Fold a remote processing status into this record.
    pub fn apply_processing_status(&mut self, status: &ProcessingStatus) -> bool {
        match status {
            ProcessingStatus::Pending => self.advance(UploadStatus::Pending, 0),
            ProcessingStatus::Uploading => self.advance(UploadStatus::Uploading, self.progress),
            ProcessingStatus::Processing => self.advance(UploadStatus::Processing, self.progress),
            ProcessingStatus::Completed | ProcessingStatus::NeedsReview => {
                self.advance(UploadStatus::Completed, 100)
            }
            ProcessingStatus::Failed => self.fail("Document processing failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_record_is_pending() {
        let record = UploadFileRecord::new("policy.pdf");
        assert_eq!(record.status, UploadStatus::Pending);
        assert_eq!(record.progress, 0);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_advance_forward_and_reject_regression() {
        let mut record = UploadFileRecord::new("policy.pdf");
        assert!(record.advance(UploadStatus::Uploading, 40));
        assert!(record.advance(UploadStatus::Processing, 10));
        assert_eq!(record.progress, 40);

        assert!(!record.advance(UploadStatus::Uploading, 90));
        assert_eq!(record.status, UploadStatus::Processing);

        assert!(record.advance(UploadStatus::Completed, 0));
        assert_eq!(record.progress, 100);
        assert!(!record.advance(UploadStatus::Completed, 100));
    }

    #[test]
    fn test_fail_is_final() {
        let mut record = UploadFileRecord::new("policy.pdf");
        assert!(record.fail("network"));
        assert_eq!(record.error.as_deref(), Some("network"));
        assert!(!record.advance(UploadStatus::Completed, 100));
        assert!(!record.fail("again"));
    }

    #[test]
    fn test_completed_cannot_fail() {
        let mut record = UploadFileRecord::new("policy.pdf");
        record.apply_processing_status(&ProcessingStatus::NeedsReview);
        assert_eq!(record.status, UploadStatus::Completed);
        assert!(!record.apply_processing_status(&ProcessingStatus::Failed));
    }

    fn any_status() -> impl Strategy<Value = UploadStatus> {
        prop_oneof![
            Just(UploadStatus::Pending),
            Just(UploadStatus::Uploading),
            Just(UploadStatus::Processing),
            Just(UploadStatus::Completed),
            Just(UploadStatus::Error),
        ]
    }

    proptest! {
        #[test]
        fn prop_record_never_regresses(
            updates in prop::collection::vec((any_status(), 0u8..=255u8), 0..32)
        ) {
            let mut record = UploadFileRecord::new("policy.pdf");
            for (status, progress) in updates {
                let before = record.clone();
                if status == UploadStatus::Error {
                    record.fail("boom");
                } else {
                    record.advance(status, progress);
                }
                prop_assert!(record.status.rank() >= before.status.rank());
                prop_assert!(record.progress >= before.progress);
                prop_assert!(record.progress <= 100);
                if before.status.is_final() {
                    prop_assert_eq!(record.status, before.status);
                }
            }
        }
    }
}
