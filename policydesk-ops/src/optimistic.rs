//! Published value of an operation that may be optimistic.

use policydesk_core::DeskError;

/// What an operation currently shows to its observers.
///
/// Rollback is a transition on this type: an unconfirmed value becomes
/// [`OptimisticState::Failed`], never a leftover "might be true".
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OptimisticState<T> {
    #[default]
    Idle,
    /// Work in flight, optionally with a locally assumed result.
    Pending { optimistic: Option<T> },
    /// Confirmed by the remote side.
    Settled(T),
    Failed(DeskError),
}

impl<T> OptimisticState<T> {
    /// The best-known value: a pending optimistic value or a settled one.
    pub fn current(&self) -> Option<&T> {
        match self {
            Self::Pending {
                optimistic: Some(value),
            }
            | Self::Settled(value) => Some(value),
            Self::Idle | Self::Pending { optimistic: None } | Self::Failed(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// True while the shown value has not been confirmed.
    pub fn is_unconfirmed(&self) -> bool {
        matches!(
            self,
            Self::Pending {
                optimistic: Some(_)
            }
        )
    }

    pub fn error(&self) -> Option<&DeskError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Replace a pending value with the failure. Settled values are kept.
    pub(crate) fn roll_back(&mut self, err: &DeskError) {
        if self.is_pending() {
            *self = Self::Failed(err.clone());
        }
    }
}
