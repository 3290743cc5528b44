//! # Core Type Definitions
//!
//! This module contains all record types for the CiviSense capture engine:
//! - Identifiers (`IssueId`, `WardId`)
//! - Closed enumerations (`Category`, `Priority`, `IssueStatus`)
//! - Records (`GeoPoint`, `Photo`, `NewIssue`, `Issue`, `Ward`)
//! - Error types (`CivicError`, `GeolocationError`)
//!
//! ## Closed Sets
//!
//! Category, priority and status are never free-form strings. Parsing from
//! text goes through `FromStr` and rejects anything outside the set with
//! `CivicError::Validation`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier assigned to an issue by the store on first persist.
///
/// Ids are allocated from a persisted monotonic counter and are never reused,
/// even after the issue is purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IssueId(pub u64);

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of an administrative ward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WardId(pub u32);

impl fmt::Display for WardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// CATEGORY
// =============================================================================

/// Kind of civic problem being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Pothole,
    Garbage,
    Drainage,
    Streetlight,
    Road,
    Water,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Self; 6] = [
        Self::Pothole,
        Self::Garbage,
        Self::Drainage,
        Self::Streetlight,
        Self::Road,
        Self::Water,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pothole => "pothole",
            Self::Garbage => "garbage",
            Self::Drainage => "drainage",
            Self::Streetlight => "streetlight",
            Self::Road => "road",
            Self::Water => "water",
        }
    }

    /// Stable single-byte code used as an index key.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CivicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CivicError::Validation(format!("unknown category '{}'", s)))
    }
}

// =============================================================================
// PRIORITY
// =============================================================================

/// Urgency label attached to an issue.
///
/// Seeded from advisory input, always overridable by the author.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CivicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CivicError::Validation(format!("unknown priority '{}'", s)))
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Sync lifecycle status of a persisted issue.
///
/// Allowed moves are listed in [`crate::lifecycle::TRANSITIONS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Persisted locally, not queued for transmission.
    Draft,
    /// Persisted locally and queued, not yet confirmed by the remote authority.
    PendingSync,
    /// Confirmed by the remote authority.
    Synced,
    /// Last transmission attempt failed; needs attention.
    SyncFailed,
}

impl IssueStatus {
    pub const ALL: [Self; 4] = [
        Self::Draft,
        Self::PendingSync,
        Self::Synced,
        Self::SyncFailed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingSync => "pending_sync",
            Self::Synced => "synced",
            Self::SyncFailed => "sync_failed",
        }
    }

    /// Stable single-byte code used as an index key.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = CivicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| CivicError::Validation(format!("unknown status '{}'", s)))
    }
}

// =============================================================================
// LOCATION & MEDIA
// =============================================================================

/// A WGS84 coordinate with an optional human-readable address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: Option<String>,
}

impl GeoPoint {
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            address: None,
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Reject NaN/infinite values and out-of-range coordinates.
    pub fn validate(&self) -> Result<(), CivicError> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(CivicError::Validation(
                "coordinates must be finite numbers".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(CivicError::Validation(format!(
                "latitude {} out of range",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(CivicError::Validation(format!(
                "longitude {} out of range",
                self.lng
            )));
        }
        Ok(())
    }
}

/// A binary-encoded image attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    /// MIME type, e.g. `image/jpeg`.
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Photo {
    #[must_use]
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }

    #[must_use]
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self::new("image/jpeg", bytes)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// =============================================================================
// ISSUE
// =============================================================================

/// An issue that has not been persisted yet (no id, no capture time).
///
/// There is no ward field: the store resolves the ward from `location`
/// against its own ward directory when the issue is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    pub category: Category,
    pub description: String,
    pub location: Option<GeoPoint>,
    pub photos: Vec<Photo>,
    pub author_ref: String,
    pub priority: Priority,
    pub status: IssueStatus,
    /// Advisory description shown when `description` is empty.
    pub advisory_note: Option<String>,
}

impl NewIssue {
    /// Minimal draft with no evidence attached.
    #[must_use]
    pub fn draft(category: Category, author_ref: impl Into<String>) -> Self {
        Self {
            category,
            description: String::new(),
            location: None,
            photos: Vec::new(),
            author_ref: author_ref.into(),
            priority: Priority::default(),
            status: IssueStatus::Draft,
            advisory_note: None,
        }
    }

    /// Same issue, queued for transmission at `location`.
    #[must_use]
    pub fn queued_at(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self.status = IssueStatus::PendingSync;
        self
    }
}

/// A persisted civic issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub category: Category,
    pub description: String,
    pub location: Option<GeoPoint>,
    pub ward_id: Option<WardId>,
    pub photos: Vec<Photo>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub captured_at: DateTime<Utc>,
    pub author_ref: String,
    pub priority: Priority,
    pub status: IssueStatus,
    pub advisory_note: Option<String>,
}

impl Issue {
    /// Materialize a new issue with its store-assigned id, resolved ward and
    /// capture time.
    #[must_use]
    pub fn from_new(
        id: IssueId,
        new: NewIssue,
        ward_id: Option<WardId>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            category: new.category,
            description: new.description,
            location: new.location,
            ward_id,
            photos: new.photos,
            captured_at,
            author_ref: new.author_ref,
            priority: new.priority,
            status: new.status,
            advisory_note: new.advisory_note,
        }
    }

    /// Text to show for this issue.
    ///
    /// Falls back to the advisory note when the author left the description
    /// empty. The stored `description` stays empty.
    #[must_use]
    pub fn display_description(&self) -> &str {
        if !self.description.trim().is_empty() {
            return &self.description;
        }
        self.advisory_note.as_deref().unwrap_or("")
    }

    /// Key the remote authority uses to recognise a resubmission.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.author_ref,
            self.id.0,
            self.captured_at.timestamp_millis()
        )
    }
}

// =============================================================================
// WARD
// =============================================================================

/// An administrative region with a polygon boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ward {
    pub id: WardId,
    pub name: String,
    /// Grouping key for zone-level reporting.
    pub zone: String,
    /// Responsible ward engineer.
    #[serde(default)]
    pub engineer: String,
    /// Ordered `(lat, lng)` vertices of a simple polygon.
    pub boundary: Vec<(f64, f64)>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Failure to obtain a location fix.
///
/// Always recoverable: the capture session stays where it is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("no location fix within {0} ms")]
    Timeout(u64),

    #[error("location provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur in the CiviSense engine.
///
/// - No silent failures: "did nothing" is never reported as success
/// - Use `Result<T, CivicError>` for fallible operations
/// - The engine never panics; every error is surfaced to the caller
#[derive(Debug, Error)]
pub enum CivicError {
    /// A required field is missing or malformed. Blocks the transition only.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The storage medium has no space left for the write.
    #[error("Storage full: {0}")]
    StorageFull(String),

    /// The storage medium rejected a read or write.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The referenced issue does not exist.
    #[error("Issue not found: {0}")]
    NotFound(IssueId),

    /// The status change is not in the transition table.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: IssueStatus, to: IssueStatus },

    #[error("Geolocation failed: {0}")]
    Geolocation(#[from] GeolocationError),
}

impl CivicError {
    /// Storage failures are retryable and must be shown to the user.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::StorageFull(_) | Self::StorageUnavailable(_) | Self::SerializationError(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
