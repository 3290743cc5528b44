//! # Authority Ledger
//!
//! In-memory record of every issue the authority has accepted, keyed by
//! idempotency key so that a resubmission never creates a second record.

use super::types::{IssueFilter, IssueSummary, StatusResponse};
use crate::sync::IssuePayload;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One accepted issue.
#[derive(Debug, Clone)]
pub struct Received {
    pub receipt: u64,
    pub payload: IssuePayload,
    pub received_at: DateTime<Utc>,
}

/// Result of offering a payload to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    New(u64),
    Duplicate(u64),
}

/// Accepted issues, keyed by idempotency key.
#[derive(Debug, Default)]
pub struct Ledger {
    by_key: BTreeMap<String, Received>,
    next_receipt: u64,
    duplicates: u64,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `payload` unless its idempotency key is already known.
    pub fn admit(&mut self, payload: IssuePayload, now: DateTime<Utc>) -> Admission {
        if let Some(existing) = self.by_key.get(&payload.idempotency_key) {
            self.duplicates = self.duplicates.saturating_add(1);
            return Admission::Duplicate(existing.receipt);
        }

        self.next_receipt = self.next_receipt.saturating_add(1);
        let receipt = self.next_receipt;
        self.by_key.insert(
            payload.idempotency_key.clone(),
            Received {
                receipt,
                payload,
                received_at: now,
            },
        );
        Admission::New(receipt)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Accepted issues matching `filter`, in receipt order.
    #[must_use]
    pub fn list(&self, filter: &IssueFilter) -> Vec<IssueSummary> {
        let mut items: Vec<&Received> = self
            .by_key
            .values()
            .filter(|r| {
                filter
                    .ward
                    .is_none_or(|w| r.payload.ward_id.map(|id| id.0) == Some(w))
            })
            .filter(|r| filter.category.is_none_or(|c| r.payload.category == c))
            .filter(|r| {
                filter
                    .author
                    .as_deref()
                    .is_none_or(|a| r.payload.author_ref == a)
            })
            .collect();
        items.sort_by_key(|r| r.receipt);

        items
            .into_iter()
            .map(|r| IssueSummary {
                receipt: r.receipt,
                idempotency_key: r.payload.idempotency_key.clone(),
                category: r.payload.category,
                description: r.payload.description.clone(),
                location: r.payload.location.clone(),
                ward_id: r.payload.ward_id,
                priority: r.payload.priority,
                author_ref: r.payload.author_ref.clone(),
                photo_count: r.payload.photos.len(),
                captured_at: r.payload.captured_at,
                received_at: r.received_at,
            })
            .collect()
    }

    #[must_use]
    pub fn status(&self) -> StatusResponse {
        let mut by_category = BTreeMap::new();
        let mut unresolved_ward = 0usize;
        for received in self.by_key.values() {
            let count = by_category
                .entry(received.payload.category.as_str().to_string())
                .or_insert(0usize);
            *count = count.saturating_add(1);
            if received.payload.ward_id.is_none() {
                unresolved_ward = unresolved_ward.saturating_add(1);
            }
        }
        StatusResponse {
            total_issues: self.by_key.len(),
            by_category,
            unresolved_ward,
            duplicate_submissions: self.duplicates,
        }
    }
}
