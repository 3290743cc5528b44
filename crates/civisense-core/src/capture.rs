//! # Capture Session
//!
//! The three-phase state machine a field worker walks through to report an
//! issue:
//!
//! ```text
//! SelectingCategory ──(category set)──▶ CapturingEvidence ──(location fix)──▶ ReviewingAndSubmitting
//!         ◀──────────────── back() ───────────────┘ ◀────────────── back() ──────────────┘
//! ```
//!
//! A `CaptureSession` is an ordinary value owned by the caller. Every
//! transition takes `&mut self` and either succeeds or leaves the session
//! untouched. `submit` consumes the session on success; on failure the
//! session is handed back unchanged so the author can retry without
//! re-entering anything.
//!
//! Acquiring a location fix is asynchronous and lives with the caller; the
//! session only records the outcome (`record_fix` / `record_location_error`).

use crate::advisory::{Advisor, Advisory};
use crate::primitives::{MAX_DESCRIPTION_LENGTH, MAX_PHOTO_BYTES, MAX_PHOTOS};
use crate::storage::IssueStore;
use crate::wards::WardDirectory;
use crate::{
    Category, CivicError, GeoPoint, GeolocationError, IssueId, IssueStatus, NewIssue, Photo,
    Priority, WardId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a capture session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CapturePhase {
    SelectingCategory,
    CapturingEvidence,
    ReviewingAndSubmitting,
}

impl CapturePhase {
    /// 1-based step number, as shown in the progress indicator.
    #[must_use]
    pub const fn step(self) -> u8 {
        match self {
            Self::SelectingCategory => 1,
            Self::CapturingEvidence => 2,
            Self::ReviewingAndSubmitting => 3,
        }
    }
}

/// A submission that the store refused, with the untouched session.
#[derive(Debug, Error)]
#[error("submission rejected: {error}")]
pub struct SubmitRejected {
    pub session: Box<CaptureSession>,
    #[source]
    pub error: CivicError,
}

/// An in-progress issue report.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSession {
    phase: CapturePhase,
    author_ref: String,
    category: Option<Category>,
    location: Option<GeoPoint>,
    ward_id: Option<WardId>,
    photos: Vec<Photo>,
    description: String,
    priority_override: Option<Priority>,
    advisory: Option<Advisory>,
    last_location_error: Option<GeolocationError>,
}

impl CaptureSession {
    /// Start a new report for `author_ref`.
    #[must_use]
    pub fn new(author_ref: impl Into<String>) -> Self {
        Self {
            phase: CapturePhase::SelectingCategory,
            author_ref: author_ref.into(),
            category: None,
            location: None,
            ward_id: None,
            photos: Vec::new(),
            description: String::new(),
            priority_override: None,
            advisory: None,
            last_location_error: None,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    #[must_use]
    pub fn author_ref(&self) -> &str {
        &self.author_ref
    }

    #[must_use]
    pub fn category(&self) -> Option<Category> {
        self.category
    }

    #[must_use]
    pub fn location(&self) -> Option<&GeoPoint> {
        self.location.as_ref()
    }

    /// Ward resolved from the current fix, cached on the draft.
    #[must_use]
    pub fn ward_id(&self) -> Option<WardId> {
        self.ward_id
    }

    /// A fix was obtained but lies outside every known ward.
    #[must_use]
    pub fn is_ward_unresolved(&self) -> bool {
        self.location.is_some() && self.ward_id.is_none()
    }

    #[must_use]
    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn advisory(&self) -> Option<&Advisory> {
        self.advisory.as_ref()
    }

    #[must_use]
    pub fn last_location_error(&self) -> Option<&GeolocationError> {
        self.last_location_error.as_ref()
    }

    /// Priority the issue will be submitted with.
    ///
    /// Explicit choice, else the advisory suggestion, else `medium`.
    #[must_use]
    pub fn effective_priority(&self) -> Priority {
        self.priority_override
            .or_else(|| self.advisory.as_ref().map(|a| a.priority))
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Phase transitions
    // -------------------------------------------------------------------------

    /// Move to the next phase if its entry requirement is met.
    pub fn advance(&mut self) -> Result<CapturePhase, CivicError> {
        let next = match self.phase {
            CapturePhase::SelectingCategory => {
                if self.category.is_none() {
                    return Err(CivicError::Validation(
                        "select an issue category first".to_string(),
                    ));
                }
                CapturePhase::CapturingEvidence
            }
            CapturePhase::CapturingEvidence => {
                if self.location.is_none() {
                    return Err(CivicError::Validation(
                        "capture a location before reviewing".to_string(),
                    ));
                }
                CapturePhase::ReviewingAndSubmitting
            }
            CapturePhase::ReviewingAndSubmitting => {
                return Err(CivicError::Validation(
                    "already at the final step".to_string(),
                ));
            }
        };
        self.phase = next;
        Ok(next)
    }

    /// Step back one phase. Nothing entered so far is discarded.
    pub fn back(&mut self) -> CapturePhase {
        self.phase = match self.phase {
            CapturePhase::SelectingCategory | CapturePhase::CapturingEvidence => {
                CapturePhase::SelectingCategory
            }
            CapturePhase::ReviewingAndSubmitting => CapturePhase::CapturingEvidence,
        };
        self.phase
    }

    // -------------------------------------------------------------------------
    // Field edits
    // -------------------------------------------------------------------------

    pub fn select_category(&mut self, category: Category) {
        self.category = Some(category);
    }

    /// Record a successful location fix and resolve its ward.
    ///
    /// Ward resolution happens here, synchronously, on every fix. If the
    /// directory lookup fails the previous fix is kept.
    pub fn record_fix<D>(&mut self, point: GeoPoint, wards: &D) -> Result<Option<WardId>, CivicError>
    where
        D: WardDirectory + ?Sized,
    {
        point.validate()?;
        let ward_id = wards.resolve(&point)?;
        self.location = Some(point);
        self.ward_id = ward_id;
        self.last_location_error = None;
        Ok(ward_id)
    }

    /// Record a failed location request. The phase does not change.
    pub fn record_location_error(&mut self, error: GeolocationError) -> CivicError {
        self.last_location_error = Some(error.clone());
        CivicError::Geolocation(error)
    }

    /// Attach a photo. Returns the number of photos now attached.
    pub fn add_photo(&mut self, photo: Photo) -> Result<usize, CivicError> {
        if photo.is_empty() {
            return Err(CivicError::Validation("photo is empty".to_string()));
        }
        if photo.len() > MAX_PHOTO_BYTES {
            return Err(CivicError::Validation(format!(
                "photo of {} bytes exceeds maximum {} bytes",
                photo.len(),
                MAX_PHOTO_BYTES
            )));
        }
        if self.photos.len() >= MAX_PHOTOS {
            return Err(CivicError::Validation(format!(
                "at most {} photos per issue",
                MAX_PHOTOS
            )));
        }
        self.photos.push(photo);
        Ok(self.photos.len())
    }

    /// Remove the photo at `index`, keeping the order of the rest.
    pub fn remove_photo(&mut self, index: usize) -> Result<Photo, CivicError> {
        if index >= self.photos.len() {
            return Err(CivicError::Validation(format!(
                "no photo at index {} ({} attached)",
                index,
                self.photos.len()
            )));
        }
        Ok(self.photos.remove(index))
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<(), CivicError> {
        let description = description.into();
        if description.len() > MAX_DESCRIPTION_LENGTH {
            return Err(CivicError::Validation(format!(
                "description length {} exceeds maximum {} bytes",
                description.len(),
                MAX_DESCRIPTION_LENGTH
            )));
        }
        self.description = description;
        Ok(())
    }

    /// Explicit priority chosen by the author. Overrides any advisory value.
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority_override = Some(priority);
    }

    /// Ask `advisor` for fresh advice based on the current evidence.
    pub fn refresh_advisory(&mut self, advisor: &dyn Advisor) -> Option<&Advisory> {
        self.advisory = advisor.analyze(
            self.photos.first(),
            self.location.as_ref(),
            self.category,
        );
        self.advisory.as_ref()
    }

    // -------------------------------------------------------------------------
    // Submission
    // -------------------------------------------------------------------------

    /// Build the issue this session would submit, without persisting it.
    pub fn to_new_issue(&self, as_draft: bool) -> Result<NewIssue, CivicError> {
        let category = self.category.ok_or_else(|| {
            CivicError::Validation("an issue category is required".to_string())
        })?;
        if !as_draft && self.location.is_none() {
            return Err(CivicError::Validation(
                "a location is required to submit; save as draft instead".to_string(),
            ));
        }
        if !as_draft && self.phase != CapturePhase::ReviewingAndSubmitting {
            return Err(CivicError::Validation(
                "review the report before submitting it".to_string(),
            ));
        }

        Ok(NewIssue {
            category,
            description: self.description.clone(),
            location: self.location.clone(),
            photos: self.photos.clone(),
            author_ref: self.author_ref.clone(),
            priority: self.effective_priority(),
            status: if as_draft {
                IssueStatus::Draft
            } else {
                IssueStatus::PendingSync
            },
            advisory_note: self.advisory.as_ref().map(|a| a.description.clone()),
        })
    }

    /// Persist the report as a draft or queue it for sync.
    ///
    /// Validation happens before any store write. If validation or the store
    /// fails, the session comes back unchanged inside `SubmitRejected`.
    pub fn submit<S>(self, store: &S, as_draft: bool) -> Result<IssueId, SubmitRejected>
    where
        S: IssueStore + ?Sized,
    {
        let issue = match self.to_new_issue(as_draft) {
            Ok(issue) => issue,
            Err(error) => return Err(self.rejected(error)),
        };
        match store.create(issue) {
            Ok(id) => Ok(id),
            Err(error) => Err(self.rejected(error)),
        }
    }

    fn rejected(self, error: CivicError) -> SubmitRejected {
        SubmitRejected {
            session: Box::new(self),
            error,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
