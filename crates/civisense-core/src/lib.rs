//! # civisense-core
//!
//! The offline capture engine for CiviSense field reporting.
//!
//! This crate owns everything that must work with no network at all:
//! - The issue model and its closed status lifecycle
//! - Durable, transactional local storage (redb)
//! - Ward reference data and point-in-polygon resolution
//! - The three-phase capture session that builds an issue
//!
//! ## Architectural Constraints
//!
//! - Synchronous and deterministic: NO async, NO network dependencies
//! - Every persisted write is one transaction, committed before returning
//! - Status only moves forward through the transition table in `lifecycle`
//! - Delivery to the remote authority lives in the `civisense` app crate

// =============================================================================
// MODULES
// =============================================================================

pub mod advisory;
pub mod capture;
pub mod geometry;
pub mod lifecycle;
pub mod primitives;
pub mod storage;
pub mod types;
pub mod wards;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Category, CivicError, GeoPoint, GeolocationError, Issue, IssueId, IssueStatus, NewIssue,
    Photo, Priority, Ward, WardId,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use advisory::{Advisor, Advisory, NoAdvice};
pub use capture::{CapturePhase, CaptureSession, SubmitRejected};
pub use lifecycle::TRANSITIONS;
pub use storage::{IssueStore, RedbStore, StatusCounts, validate_new_issue};
pub use wards::{WardDirectory, sample_wards, validate_seed};
