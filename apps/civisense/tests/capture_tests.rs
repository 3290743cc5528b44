//! Integration tests for the capture flow: location acquisition, ward
//! resolution and submission into a real store.

#![allow(clippy::unwrap_used, clippy::panic)]

use civisense::geolocation::{FixedPosition, GeolocationProvider, acquire_location};
use civisense_core::{
    CapturePhase, CaptureSession, Category, CivicError, GeoPoint, GeolocationError, IssueStatus,
    IssueStore, Photo, RedbStore, WardDirectory, WardId, sample_wards,
};
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// HELPERS
// =============================================================================

/// Provider whose fix never arrives.
struct NoFix;

impl GeolocationProvider for NoFix {
    async fn current_position(&self) -> Result<GeoPoint, GeolocationError> {
        std::future::pending().await
    }
}

fn seeded_store() -> (TempDir, RedbStore) {
    let dir = TempDir::new().unwrap();
    let store = RedbStore::open(dir.path().join("issues.redb")).unwrap();
    assert!(store.seed_if_empty(&sample_wards()).unwrap());
    (dir, store)
}

fn session_with_category(category: Category) -> CaptureSession {
    let mut session = CaptureSession::new("fw-1");
    session.select_category(category);
    session.advance().unwrap();
    session
}

// =============================================================================
// LOCATION
// =============================================================================

#[tokio::test]
async fn test_fix_resolves_sample_ward() {
    let (_dir, store) = seeded_store();
    let mut session = session_with_category(Category::Pothole);

    let ward = acquire_location(
        &mut session,
        &FixedPosition(GeoPoint::new(22.3060, 73.1850)),
        &store,
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    assert_eq!(ward, Some(WardId(1)));
    let resolved = store.ward(WardId(1)).unwrap().unwrap();
    assert_eq!(resolved.name, "Ward 1 - Alkapuri");
    assert!(!session.is_ward_unresolved());
}

#[tokio::test]
async fn test_fix_outside_every_ward_is_unresolved() {
    let (_dir, store) = seeded_store();
    let mut session = session_with_category(Category::Water);

    let ward = acquire_location(
        &mut session,
        &FixedPosition(GeoPoint::new(23.0225, 72.5714)),
        &store,
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    assert_eq!(ward, None);
    assert!(session.is_ward_unresolved());
    assert!(session.location().is_some());
}

#[tokio::test]
async fn test_location_timeout_keeps_session_intact() {
    let (_dir, store) = seeded_store();
    let mut session = session_with_category(Category::Garbage);
    session.add_photo(Photo::jpeg(vec![1, 2, 3])).unwrap();
    session.set_description("Overflowing bin").unwrap();
    let before = session.clone();

    let result = acquire_location(&mut session, &NoFix, &store, Duration::from_millis(50)).await;

    assert!(matches!(
        result,
        Err(CivicError::Geolocation(GeolocationError::Timeout(50)))
    ));
    assert_eq!(session.phase(), CapturePhase::CapturingEvidence);
    assert_eq!(
        session.last_location_error(),
        Some(&GeolocationError::Timeout(50))
    );
    assert_eq!(session.photos(), before.photos());
    assert_eq!(session.description(), "Overflowing bin");
    assert!(session.location().is_none());
    assert!(session.advance().is_err());
}

#[tokio::test]
async fn test_new_fix_clears_previous_error() {
    let (_dir, store) = seeded_store();
    let mut session = session_with_category(Category::Road);

    let _ = acquire_location(&mut session, &NoFix, &store, Duration::from_millis(10)).await;
    assert!(session.last_location_error().is_some());

    acquire_location(
        &mut session,
        &FixedPosition(GeoPoint::new(22.3060, 73.1850)),
        &store,
        Duration::from_secs(1),
    )
    .await
    .unwrap();
    assert!(session.last_location_error().is_none());
    assert_eq!(
        session.advance().unwrap(),
        CapturePhase::ReviewingAndSubmitting
    );
}

// =============================================================================
// SUBMISSION
// =============================================================================

#[tokio::test]
async fn test_located_report_is_queued_with_its_ward() {
    let (_dir, store) = seeded_store();
    let mut session = session_with_category(Category::Drainage);
    acquire_location(
        &mut session,
        &FixedPosition(GeoPoint::new(22.3060, 73.1850).with_address("Alkapuri main road")),
        &store,
        Duration::from_secs(1),
    )
    .await
    .unwrap();
    session.advance().unwrap();

    let id = session.submit(&store, false).unwrap();

    let issue = store.get(id).unwrap().unwrap();
    assert_eq!(issue.status, IssueStatus::PendingSync);
    assert_eq!(issue.ward_id, Some(WardId(1)));
    assert_eq!(
        issue.location.unwrap().address.as_deref(),
        Some("Alkapuri main road")
    );
}

#[test]
fn test_draft_without_location_is_saved_but_not_queueable() {
    let (_dir, store) = seeded_store();
    let session = session_with_category(Category::Streetlight);

    let id = session.submit(&store, true).unwrap();

    let issue = store.get(id).unwrap().unwrap();
    assert_eq!(issue.status, IssueStatus::Draft);
    assert!(issue.location.is_none());
    assert!(matches!(
        store.queue_draft(id),
        Err(CivicError::Validation(_))
    ));
    assert_eq!(store.get(id).unwrap().unwrap().status, IssueStatus::Draft);
}

#[test]
fn test_submit_without_location_returns_session() {
    let (_dir, store) = seeded_store();
    let mut session = session_with_category(Category::Pothole);
    session.set_description("Deep pothole near the bus stop").unwrap();

    let rejected = session.submit(&store, false).unwrap_err();

    assert!(matches!(rejected.error, CivicError::Validation(_)));
    assert_eq!(rejected.session.description(), "Deep pothole near the bus stop");
    assert_eq!(store.status_counts().unwrap().total(), 0);
}
