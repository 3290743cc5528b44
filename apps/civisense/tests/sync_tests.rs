//! Integration tests for the sync coordinator.
//!
//! Most tests drive the coordinator against an in-process mock authority.
//! The last one runs a real authority server and the HTTP transport.

#![allow(clippy::unwrap_used, clippy::panic)]

use civisense::api::{AppState, ServerOptions, create_router_with};
use civisense::sync::{
    Delivery, HttpTransport, IssuePayload, SyncCoordinator, SyncError, TransmitError, Transport,
};
use civisense_core::{
    Category, GeoPoint, IssueId, IssueStatus, IssueStore, NewIssue, Photo, RedbStore,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// HELPERS
// =============================================================================

/// Authority stand-in that dedupes by idempotency key.
struct MockAuthority {
    online: AtomicBool,
    held: Mutex<BTreeSet<String>>,
    rejected_ids: Mutex<BTreeSet<u64>>,
    transmits: AtomicUsize,
}

impl MockAuthority {
    fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
            held: Mutex::new(BTreeSet::new()),
            rejected_ids: Mutex::new(BTreeSet::new()),
            transmits: AtomicUsize::new(0),
        }
    }

    fn rejecting(ids: &[u64]) -> Self {
        let authority = Self::online();
        authority.rejected_ids.lock().unwrap().extend(ids);
        authority
    }

    fn held(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    fn transmits(&self) -> usize {
        self.transmits.load(Ordering::SeqCst)
    }
}

impl Transport for MockAuthority {
    async fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn transmit(&self, payload: &IssuePayload) -> Result<Delivery, TransmitError> {
        self.transmits.fetch_add(1, Ordering::SeqCst);
        if self.rejected_ids.lock().unwrap().contains(&payload.local_id) {
            return Err(TransmitError::Rejected {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        if self.held.lock().unwrap().insert(payload.idempotency_key.clone()) {
            Ok(Delivery::Created)
        } else {
            Ok(Delivery::Duplicate)
        }
    }
}

/// Transport that never answers a transmit.
struct Stalled;

impl Transport for Stalled {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn transmit(&self, _payload: &IssuePayload) -> Result<Delivery, TransmitError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Delivery::Created)
    }
}

fn open_store() -> (TempDir, Arc<RedbStore>) {
    let dir = TempDir::new().unwrap();
    let store = RedbStore::open(dir.path().join("issues.redb")).unwrap();
    (dir, Arc::new(store))
}

fn queue(store: &RedbStore, category: Category) -> IssueId {
    let mut issue =
        NewIssue::draft(category, "fw-1").queued_at(GeoPoint::new(22.3080, 73.1830));
    issue.photos.push(Photo::jpeg(vec![0xFF, 0xD8, 0xFF, 0xE0]));
    store.create(issue).unwrap()
}

// =============================================================================
// CYCLE OUTCOMES
// =============================================================================

#[tokio::test]
async fn test_third_rejected_after_two_accepted() {
    let (_dir, store) = open_store();
    let first = queue(&store, Category::Pothole);
    let second = queue(&store, Category::Garbage);
    let third = queue(&store, Category::Drainage);

    let coordinator = SyncCoordinator::new(store.clone(), MockAuthority::rejecting(&[third.0]));
    let report = coordinator.run_cycle(false).await.unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.synced, vec![first, second]);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.failed[0].id, third);
    assert!(!report.cancelled);

    assert_eq!(store.get(first).unwrap().unwrap().status, IssueStatus::Synced);
    assert_eq!(store.get(second).unwrap().unwrap().status, IssueStatus::Synced);
    assert_eq!(
        store.get(third).unwrap().unwrap().status,
        IssueStatus::SyncFailed
    );
    assert_eq!(coordinator.transport().held(), 2);
}

#[tokio::test]
async fn test_cycle_records_each_outcome() {
    let (_dir, store) = open_store();
    let first = queue(&store, Category::Pothole);
    let second = queue(&store, Category::Garbage);
    let third = queue(&store, Category::Drainage);

    let coordinator = SyncCoordinator::new(store.clone(), MockAuthority::rejecting(&[second.0]));
    let report = coordinator.run_cycle(false).await.unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.synced, vec![first, third]);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.failed[0].id, second);
    assert!(report.failed[0].reason.contains("500"));

    let counts = store.status_counts().unwrap();
    assert_eq!(counts.get(IssueStatus::Synced), 2);
    assert_eq!(counts.get(IssueStatus::SyncFailed), 1);
    assert_eq!(counts.get(IssueStatus::PendingSync), 0);
}

#[tokio::test]
async fn test_offline_cycle_changes_nothing() {
    let (_dir, store) = open_store();
    queue(&store, Category::Water);
    let authority = MockAuthority::online();
    authority.online.store(false, Ordering::SeqCst);

    let coordinator = SyncCoordinator::new(store.clone(), authority);
    let result = coordinator.run_cycle(false).await;

    assert!(matches!(result, Err(SyncError::Offline)));
    assert_eq!(coordinator.transport().transmits(), 0);
    assert_eq!(store.status_counts().unwrap().get(IssueStatus::PendingSync), 1);
}

#[tokio::test]
async fn test_empty_outbox_is_not_offline() {
    let (_dir, store) = open_store();
    let coordinator = SyncCoordinator::new(store, MockAuthority::online());

    let report = coordinator.run_cycle(false).await.unwrap();

    assert!(report.is_empty());
}

#[tokio::test]
async fn test_drafts_are_never_sent() {
    let (_dir, store) = open_store();
    store.create(NewIssue::draft(Category::Road, "fw-1")).unwrap();
    let queued = queue(&store, Category::Road);

    let coordinator = SyncCoordinator::new(store.clone(), MockAuthority::online());
    let report = coordinator.run_cycle(true).await.unwrap();

    assert_eq!(report.synced, vec![queued]);
    assert_eq!(store.status_counts().unwrap().get(IssueStatus::Draft), 1);
}

#[tokio::test]
async fn test_transmit_timeout_marks_failed() {
    let (_dir, store) = open_store();
    let id = queue(&store, Category::Streetlight);

    let coordinator = SyncCoordinator::new(store.clone(), Stalled)
        .with_transmit_timeout(Duration::from_millis(50));
    let report = coordinator.run_cycle(false).await.unwrap();

    assert_eq!(report.failed_count(), 1);
    assert!(report.failed[0].reason.contains("50 ms"));
    assert_eq!(
        store.get(id).unwrap().unwrap().status,
        IssueStatus::SyncFailed
    );
}

#[tokio::test]
async fn test_cancelled_transmit_marks_failed_and_ends_cycle() {
    let (_dir, store) = open_store();
    let in_flight = queue(&store, Category::Pothole);
    let untouched = queue(&store, Category::Water);

    let coordinator = SyncCoordinator::new(store.clone(), Stalled)
        .with_transmit_timeout(Duration::from_secs(30));
    let cancel = coordinator.cancel_handle();

    let (report, ()) = tokio::join!(coordinator.run_cycle(false), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let report = report.unwrap();

    assert!(report.cancelled);
    assert!(report.synced.is_empty());
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.failed[0].id, in_flight);
    assert!(report.failed[0].reason.contains("cancelled"));
    assert_eq!(
        store.get(in_flight).unwrap().unwrap().status,
        IssueStatus::SyncFailed
    );
    assert_eq!(
        store.get(untouched).unwrap().unwrap().status,
        IssueStatus::PendingSync
    );
}

#[tokio::test]
async fn test_cancel_does_not_carry_into_next_cycle() {
    let (_dir, store) = open_store();
    let coordinator = SyncCoordinator::new(store.clone(), MockAuthority::online());
    coordinator.cancel_handle().cancel();

    let id = queue(&store, Category::Road);
    let report = coordinator.run_cycle(false).await.unwrap();

    assert!(!report.cancelled);
    assert_eq!(report.synced, vec![id]);
}

// =============================================================================
// RETRY & IDEMPOTENCY
// =============================================================================

#[tokio::test]
async fn test_failed_issue_waits_for_retry_cycle() {
    let (_dir, store) = open_store();
    let id = queue(&store, Category::Garbage);
    let coordinator = SyncCoordinator::new(store.clone(), MockAuthority::rejecting(&[id.0]));

    coordinator.run_cycle(false).await.unwrap();
    assert_eq!(store.get(id).unwrap().unwrap().status, IssueStatus::SyncFailed);

    // A regular cycle leaves failed issues alone.
    let idle = coordinator.run_cycle(false).await.unwrap();
    assert!(idle.is_empty());

    // Still rejected: the retry fails and the issue stays put.
    let retry = coordinator.run_cycle(true).await.unwrap();
    assert_eq!(retry.failed_count(), 1);
    assert_eq!(store.get(id).unwrap().unwrap().status, IssueStatus::SyncFailed);

    coordinator.transport().rejected_ids.lock().unwrap().clear();
    let retry = coordinator.run_cycle(true).await.unwrap();
    assert_eq!(retry.synced, vec![id]);
    assert_eq!(store.get(id).unwrap().unwrap().status, IssueStatus::Synced);
    assert_eq!(coordinator.transport().held(), 1);
}

#[tokio::test]
async fn test_resend_after_interrupted_cycle_is_not_duplicated() {
    let (_dir, store) = open_store();
    let id = queue(&store, Category::Pothole);
    let coordinator = SyncCoordinator::new(store.clone(), MockAuthority::online());

    // The authority took the issue but the outcome was never recorded locally.
    let issue = store.get(id).unwrap().unwrap();
    coordinator
        .transport()
        .transmit(&IssuePayload::from_issue(&issue))
        .await
        .unwrap();
    assert_eq!(issue.status, IssueStatus::PendingSync);

    let report = coordinator.run_cycle(false).await.unwrap();

    assert_eq!(report.synced, vec![id]);
    assert_eq!(report.duplicates, 1);
    assert_eq!(coordinator.transport().held(), 1);
    assert_eq!(store.get(id).unwrap().unwrap().status, IssueStatus::Synced);
}

#[tokio::test]
async fn test_outbox_is_oldest_first() {
    let (_dir, store) = open_store();
    let newer = queue(&store, Category::Water);
    let failed = queue(&store, Category::Road);
    store.update_status(failed, IssueStatus::SyncFailed).unwrap();
    let newest = queue(&store, Category::Drainage);

    let coordinator = SyncCoordinator::new(store, MockAuthority::online());

    let pending: Vec<IssueId> = coordinator
        .outbox(false)
        .unwrap()
        .iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(pending, vec![newer, newest]);

    let with_failed: Vec<IssueId> = coordinator
        .outbox(true)
        .unwrap()
        .iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(with_failed, vec![newer, failed, newest]);
}

// =============================================================================
// END TO END
// =============================================================================

#[tokio::test]
async fn test_http_sync_against_reference_authority() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new();
    let router = create_router_with(
        state.clone(),
        &ServerOptions {
            cors_origins: None,
            device_quota: 0,
        },
    );
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let (_dir, store) = open_store();
    let first = queue(&store, Category::Pothole);
    let second = queue(&store, Category::Streetlight);

    let transport =
        HttpTransport::new(format!("http://{}/", addr), Duration::from_secs(5)).unwrap();
    let coordinator = SyncCoordinator::new(store.clone(), transport);

    let report = coordinator.run_cycle(false).await.unwrap();
    assert_eq!(report.synced, vec![first, second]);
    assert_eq!(report.duplicates, 0);

    // Resending an already accepted issue is acknowledged as a duplicate.
    let issue = store.get(first).unwrap().unwrap();
    let delivery = coordinator
        .transport()
        .transmit(&IssuePayload::from_issue(&issue))
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Duplicate);

    assert_eq!(state.ledger.read().await.len(), 2);
    assert!(coordinator.run_cycle(false).await.unwrap().is_empty());
}
