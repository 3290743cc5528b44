//! # Issue Storage
//!
//! The `IssueStore` trait and its redb-backed implementation.
//!
//! Every mutating call is one ACID transaction that is committed (and, with
//! redb's default durability, fsynced) before the call returns. The sync
//! coordinator's at-least-once guarantee depends on this: an issue reported
//! as created is on disk, and a status reported as updated survives a crash.

mod redb_store;

pub use redb_store::RedbStore;

use crate::primitives::{
    MAX_AUTHOR_REF_LENGTH, MAX_DESCRIPTION_LENGTH, MAX_PHOTO_BYTES, MAX_PHOTOS,
};
use crate::{Category, CivicError, Issue, IssueId, IssueStatus, NewIssue, WardId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ISSUESTORE TRAIT
// =============================================================================

/// Durable, keyed storage for issues.
///
/// Implementations must be safe to share between the capture path and the
/// sync coordinator: each operation is atomic on its own, so no caller-side
/// lock is needed.
pub trait IssueStore: Send + Sync {
    /// Persist a new issue stamped with the current time.
    fn create(&self, issue: NewIssue) -> Result<IssueId, CivicError> {
        self.create_at(issue, Utc::now())
    }

    /// Persist a new issue with an explicit capture time.
    ///
    /// Assigns a fresh id that has never been handed out before.
    fn create_at(&self, issue: NewIssue, captured_at: DateTime<Utc>)
    -> Result<IssueId, CivicError>;

    /// Fetch one issue.
    fn get(&self, id: IssueId) -> Result<Option<Issue>, CivicError>;

    /// Move an issue to `status`.
    ///
    /// Fails with `NotFound` for unknown ids and `InvalidTransition` for
    /// moves outside the transition table. No other field changes.
    fn update_status(&self, id: IssueId, status: IssueStatus) -> Result<(), CivicError>;

    /// Queue a saved draft for sync. The draft must already have a location.
    fn queue_draft(&self, id: IssueId) -> Result<(), CivicError> {
        self.update_status(id, IssueStatus::PendingSync)
    }

    /// Issues with `status`, oldest capture first.
    fn query_by_status(&self, status: IssueStatus) -> Result<Vec<Issue>, CivicError>;

    /// Issues of one category, oldest capture first.
    fn query_by_category(&self, category: Category) -> Result<Vec<Issue>, CivicError>;

    /// Issues resolved to `ward`, oldest first. `None` selects unresolved issues.
    fn query_by_ward(&self, ward: Option<WardId>) -> Result<Vec<Issue>, CivicError>;

    /// Issues captured in `[from, to)`, oldest first.
    fn query_captured_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Issue>, CivicError>;

    /// Remove every issue with `status`. Only `synced` may be purged.
    ///
    /// Returns the number of issues removed.
    fn delete_where(&self, status: IssueStatus) -> Result<u64, CivicError>;

    /// Number of issues per status.
    fn status_counts(&self) -> Result<StatusCounts, CivicError>;
}

// =============================================================================
// STATUS COUNTS
// =============================================================================

/// Per-status issue totals, as shown on the field worker dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub draft: u64,
    pub pending_sync: u64,
    pub synced: u64,
    pub sync_failed: u64,
}

impl StatusCounts {
    #[must_use]
    pub fn get(&self, status: IssueStatus) -> u64 {
        match status {
            IssueStatus::Draft => self.draft,
            IssueStatus::PendingSync => self.pending_sync,
            IssueStatus::Synced => self.synced,
            IssueStatus::SyncFailed => self.sync_failed,
        }
    }

    fn slot(&mut self, status: IssueStatus) -> &mut u64 {
        match status {
            IssueStatus::Draft => &mut self.draft,
            IssueStatus::PendingSync => &mut self.pending_sync,
            IssueStatus::Synced => &mut self.synced,
            IssueStatus::SyncFailed => &mut self.sync_failed,
        }
    }

    /// Issues still stored locally and not yet confirmed.
    #[must_use]
    pub fn unsent(&self) -> u64 {
        self.draft
            .saturating_add(self.pending_sync)
            .saturating_add(self.sync_failed)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.unsent().saturating_add(self.synced)
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Validate a new issue before it reaches durable storage.
///
/// Issues may only be created as `draft` or `pending_sync`; anything queued
/// must carry a valid location.
pub fn validate_new_issue(issue: &NewIssue) -> Result<(), CivicError> {
    if !matches!(issue.status, IssueStatus::Draft | IssueStatus::PendingSync) {
        return Err(CivicError::Validation(format!(
            "new issues cannot start as {}",
            issue.status
        )));
    }

    match &issue.location {
        Some(location) => location.validate()?,
        None if issue.status.requires_location() => {
            return Err(CivicError::Validation(
                "a location is required before an issue can be queued".to_string(),
            ));
        }
        None => {}
    }

    if issue.description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(CivicError::Validation(format!(
            "description length {} exceeds maximum {} bytes",
            issue.description.len(),
            MAX_DESCRIPTION_LENGTH
        )));
    }
    if issue.author_ref.trim().is_empty() || issue.author_ref.len() > MAX_AUTHOR_REF_LENGTH {
        return Err(CivicError::Validation(
            "author reference must be 1..=128 bytes".to_string(),
        ));
    }
    if issue.photos.len() > MAX_PHOTOS {
        return Err(CivicError::Validation(format!(
            "{} photos attached, maximum is {}",
            issue.photos.len(),
            MAX_PHOTOS
        )));
    }
    if let Some(photo) = issue.photos.iter().find(|p| p.len() > MAX_PHOTO_BYTES) {
        return Err(CivicError::Validation(format!(
            "photo of {} bytes exceeds maximum {} bytes",
            photo.len(),
            MAX_PHOTO_BYTES
        )));
    }
    Ok(())
}
