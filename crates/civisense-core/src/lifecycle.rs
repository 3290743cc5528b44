//! # Issue Lifecycle
//!
//! The closed transition table for `IssueStatus`.
//!
//! Status only ever moves forward. There is no path back to `draft`, no path
//! out of `synced`, and `draft` can never jump straight to `synced`: a draft
//! must be queued first.

use crate::{CivicError, IssueStatus};

/// Every allowed `(from, to)` status change.
///
/// | From | To | Trigger |
/// |---|---|---|
/// | draft | pending_sync | author queues a saved draft |
/// | pending_sync | synced | remote authority accepted the issue |
/// | pending_sync | sync_failed | transmit failed, timed out or was cancelled |
/// | sync_failed | synced | a retry cycle got the issue accepted |
pub const TRANSITIONS: &[(IssueStatus, IssueStatus)] = &[
    (IssueStatus::Draft, IssueStatus::PendingSync),
    (IssueStatus::PendingSync, IssueStatus::Synced),
    (IssueStatus::PendingSync, IssueStatus::SyncFailed),
    (IssueStatus::SyncFailed, IssueStatus::Synced),
];

impl IssueStatus {
    /// Check whether `self -> next` is in the transition table.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        TRANSITIONS.contains(&(self, next))
    }

    /// Validate a status change, returning the new status.
    pub fn transition_to(self, next: Self) -> Result<Self, CivicError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CivicError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Whether an issue in this status must carry a location.
    #[must_use]
    pub const fn requires_location(self) -> bool {
        !matches!(self, Self::Draft)
    }

    /// Whether the sync coordinator picks this status up.
    ///
    /// `sync_failed` is only eligible in an explicit retry cycle.
    #[must_use]
    pub const fn is_transmittable(self, include_failed: bool) -> bool {
        match self {
            Self::PendingSync => true,
            Self::SyncFailed => include_failed,
            Self::Draft | Self::Synced => false,
        }
    }

    /// Whether issues in this status may be purged from local storage.
    #[must_use]
    pub const fn is_purgeable(self) -> bool {
        matches!(self, Self::Synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_cannot_skip_to_synced() {
        assert!(!IssueStatus::Draft.can_transition_to(IssueStatus::Synced));
        assert!(matches!(
            IssueStatus::Draft.transition_to(IssueStatus::Synced),
            Err(CivicError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn no_backward_moves() {
        for &(from, to) in TRANSITIONS {
            assert!(!to.can_transition_to(from), "{} <- {} allowed", from, to);
        }
        assert!(!IssueStatus::Synced.can_transition_to(IssueStatus::PendingSync));
        assert!(!IssueStatus::SyncFailed.can_transition_to(IssueStatus::PendingSync));
    }

    #[test]
    fn self_transitions_rejected() {
        for status in IssueStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn only_drafts_may_lack_location() {
        assert!(!IssueStatus::Draft.requires_location());
        assert!(IssueStatus::PendingSync.requires_location());
        assert!(IssueStatus::Synced.requires_location());
    }

    #[test]
    fn retry_cycle_includes_failed() {
        assert!(IssueStatus::PendingSync.is_transmittable(false));
        assert!(!IssueStatus::SyncFailed.is_transmittable(false));
        assert!(IssueStatus::SyncFailed.is_transmittable(true));
        assert!(!IssueStatus::Draft.is_transmittable(true));
    }
}
