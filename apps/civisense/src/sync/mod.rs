//! # Sync Coordinator
//!
//! Pushes queued issues to the remote authority and records the outcome.
//!
//! ## Cycle
//!
//! 1. No connectivity: the cycle ends with `SyncError::Offline`.
//! 2. Queued issues are sent oldest first, one transmit each, each bounded
//!    by the transmit timeout. A retry cycle also sends `sync_failed` issues.
//! 3. Accepted issues become `synced`; anything else becomes `sync_failed`
//!    and waits for the next retry cycle.
//! 4. A [`CancelHandle`] aborts the transmit in flight. That issue becomes
//!    `sync_failed` and the cycle ends; later issues stay `pending_sync`.
//!
//! Cycles are not transactional across issues. An interrupted cycle leaves
//! some issues `pending_sync` that the authority may already hold; the
//! idempotency key in every payload makes the resend harmless.

mod http;
mod payload;

pub use http::HttpTransport;
pub use payload::{IssuePayload, PhotoPayload};

use civisense_core::primitives::DEFAULT_TRANSMIT_TIMEOUT_MS;
use civisense_core::{CivicError, Issue, IssueId, IssueStatus, IssueStore};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

// =============================================================================
// TRANSPORT
// =============================================================================

/// How the authority acknowledged a transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// First time the authority saw this issue.
    Created,
    /// The authority already held this idempotency key.
    Duplicate,
}

/// A transmit that did not end in acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransmitError {
    #[error("rejected by authority ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("no response within {0} ms")]
    Timeout(u64),

    #[error("cancelled before the authority answered")]
    Cancelled,
}

/// Connection to the remote authority.
pub trait Transport: Send + Sync {
    /// Cheap reachability check made once per cycle.
    fn is_connected(&self) -> impl Future<Output = bool> + Send;

    /// Send one issue. Must be safe to repeat with the same payload.
    fn transmit(
        &self,
        payload: &IssuePayload,
    ) -> impl Future<Output = Result<Delivery, TransmitError>> + Send;
}

// =============================================================================
// ERRORS & REPORT
// =============================================================================

/// Why a whole cycle could not complete.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no connection")]
    Offline,

    #[error("storage error during sync: {0}")]
    Store(#[from] CivicError),
}

/// One failed issue in a cycle report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedIssue {
    pub id: IssueId,
    pub reason: String,
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: Vec<IssueId>,
    pub failed: Vec<FailedIssue>,
    /// Accepted issues the authority already had.
    pub duplicates: usize,
    /// The cycle was cancelled before the outbox was drained.
    pub cancelled: bool,
}

impl SyncReport {
    #[must_use]
    pub fn synced_count(&self) -> usize {
        self.synced.len()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Nothing was queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempted == 0
    }
}

// =============================================================================
// CANCELLATION
// =============================================================================

/// Cancels the cycle a [`SyncCoordinator`] is running.
///
/// Cloneable and `Send`, so a signal handler or UI task can hold one while
/// the cycle runs elsewhere.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Drives sync cycles against a shared store.
///
/// The store is shared with the capture path; capture may keep queueing
/// issues while a cycle runs.
pub struct SyncCoordinator<S: ?Sized, T> {
    store: Arc<S>,
    transport: T,
    transmit_timeout: Duration,
    cancel: Arc<watch::Sender<bool>>,
}

impl<S, T> SyncCoordinator<S, T>
where
    S: IssueStore + ?Sized,
    T: Transport,
{
    #[must_use]
    pub fn new(store: Arc<S>, transport: T) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            store,
            transport,
            transmit_timeout: Duration::from_millis(DEFAULT_TRANSMIT_TIMEOUT_MS),
            cancel: Arc::new(cancel),
        }
    }

    #[must_use]
    pub fn with_transmit_timeout(mut self, timeout: Duration) -> Self {
        self.transmit_timeout = timeout;
        self
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Handle that cancels the cycle running when it is used.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// Issues a cycle would send, oldest first.
    pub fn outbox(&self, include_failed: bool) -> Result<Vec<Issue>, CivicError> {
        let mut queue = self.store.query_by_status(IssueStatus::PendingSync)?;
        if include_failed {
            queue.extend(self.store.query_by_status(IssueStatus::SyncFailed)?);
            queue.sort_by_key(|issue| (issue.captured_at, issue.id));
        }
        Ok(queue)
    }

    /// Run one cycle.
    ///
    /// `include_failed` turns it into a manual retry cycle that also resends
    /// `sync_failed` issues.
    pub async fn run_cycle(&self, include_failed: bool) -> Result<SyncReport, SyncError> {
        // A cancel only applies to the cycle it was issued during.
        self.cancel.send_replace(false);
        let mut cancelled = self.cancel.subscribe();

        if !self.transport.is_connected().await {
            tracing::info!("Sync skipped: no connection");
            return Err(SyncError::Offline);
        }

        let queue = self.outbox(include_failed)?;
        tracing::info!(
            "Sync cycle started: {} issue(s) queued{}",
            queue.len(),
            if include_failed { " (retrying failed)" } else { "" }
        );

        let mut report = SyncReport {
            attempted: queue.len(),
            ..SyncReport::default()
        };

        for issue in queue {
            if *cancelled.borrow() {
                report.cancelled = true;
                break;
            }
            let payload = IssuePayload::from_issue(&issue);
            match self.send(&payload, &mut cancelled).await {
                Ok(delivery) => {
                    if self.record(issue.id, IssueStatus::Synced)? {
                        if delivery == Delivery::Duplicate {
                            report.duplicates = report.duplicates.saturating_add(1);
                        }
                        report.synced.push(issue.id);
                    }
                }
                Err(e) => {
                    tracing::warn!("Issue {} failed to sync: {}", issue.id, e);
                    // A failed retry leaves the issue where it already is.
                    let recorded = issue.status == IssueStatus::SyncFailed
                        || self.record(issue.id, IssueStatus::SyncFailed)?;
                    if recorded {
                        report.failed.push(FailedIssue {
                            id: issue.id,
                            reason: e.to_string(),
                        });
                    }
                    if e == TransmitError::Cancelled {
                        report.cancelled = true;
                        break;
                    }
                }
            }
        }

        tracing::info!(
            "Sync cycle finished: {} synced, {} failed",
            report.synced_count(),
            report.failed_count()
        );
        Ok(report)
    }

    async fn send(
        &self,
        payload: &IssuePayload,
        cancelled: &mut watch::Receiver<bool>,
    ) -> Result<Delivery, TransmitError> {
        let transmit =
            tokio::time::timeout(self.transmit_timeout, self.transport.transmit(payload));
        tokio::select! {
            result = transmit => match result {
                Ok(result) => result,
                Err(_) => Err(TransmitError::Timeout(
                    self.transmit_timeout.as_millis() as u64,
                )),
            },
            Ok(_) = cancelled.wait_for(|cancelled| *cancelled) => Err(TransmitError::Cancelled),
        }
    }

    /// Persist an outcome. Returns `false` when the issue vanished or moved
    /// underneath the cycle; storage failures abort the cycle.
    fn record(&self, id: IssueId, status: IssueStatus) -> Result<bool, SyncError> {
        match self.store.update_status(id, status) {
            Ok(()) => Ok(true),
            Err(e @ (CivicError::NotFound(_) | CivicError::InvalidTransition { .. })) => {
                tracing::error!("Could not record sync outcome for {}: {}", id, e);
                Ok(false)
            }
            Err(e) => Err(SyncError::Store(e)),
        }
    }
}
