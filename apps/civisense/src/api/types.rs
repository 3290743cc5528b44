//! # API Request/Response Types
//!
//! This module defines the JSON structures of the authority API. Submissions
//! use [`IssuePayload`], the same type the sync transport sends.

use crate::sync::IssuePayload;
use chrono::{DateTime, Utc};
use civisense_core::primitives::{MAX_DESCRIPTION_LENGTH, MAX_PHOTO_BYTES, MAX_PHOTOS};
use civisense_core::{Category, GeoPoint, Priority, WardId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// SUBMIT RESPONSE
// =============================================================================

/// Response to `POST /issues`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    /// Authority-side reference number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<u64>,
    /// The idempotency key was already known; nothing new was stored.
    #[serde(default)]
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitResponse {
    #[must_use]
    pub fn accepted(receipt: u64, duplicate: bool) -> Self {
        Self {
            success: true,
            receipt: Some(receipt),
            duplicate,
            error: None,
        }
    }

    #[must_use]
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            receipt: None,
            duplicate: false,
            error: Some(msg.into()),
        }
    }
}

/// Check a submission at the API boundary.
///
/// The authority only accepts issues that could have left a device queue:
/// a location is mandatory, and size limits match the capture limits.
pub fn validate_submission(payload: &IssuePayload) -> Result<(), String> {
    if payload.idempotency_key.trim().is_empty() {
        return Err("idempotency_key cannot be empty".to_string());
    }
    if payload.author_ref.trim().is_empty() {
        return Err("author_ref cannot be empty".to_string());
    }
    let Some(location) = &payload.location else {
        return Err("location is required".to_string());
    };
    location.validate().map_err(|e| e.to_string())?;

    if payload.description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(format!(
            "description length {} exceeds maximum {} bytes",
            payload.description.len(),
            MAX_DESCRIPTION_LENGTH
        ));
    }
    if payload.photos.len() > MAX_PHOTOS {
        return Err(format!(
            "{} photos attached, maximum is {}",
            payload.photos.len(),
            MAX_PHOTOS
        ));
    }
    let photos = payload
        .decode_photos()
        .map_err(|e| format!("invalid photo encoding: {}", e))?;
    if photos.iter().any(|p| p.len() > MAX_PHOTO_BYTES) {
        return Err(format!(
            "photo exceeds maximum {} bytes",
            MAX_PHOTO_BYTES
        ));
    }
    Ok(())
}

// =============================================================================
// ISSUE LISTING
// =============================================================================

/// Filters for `GET /issues`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueFilter {
    pub ward: Option<u32>,
    pub category: Option<Category>,
    pub author: Option<String>,
}

/// One received issue as listed by the authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSummary {
    pub receipt: u64,
    pub idempotency_key: String,
    pub category: Category,
    pub description: String,
    pub location: Option<GeoPoint>,
    pub ward_id: Option<WardId>,
    pub priority: Priority,
    pub author_ref: String,
    pub photo_count: usize,
    pub captured_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Authority ledger status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub total_issues: usize,
    pub by_category: BTreeMap<String, usize>,
    pub unresolved_ward: usize,
    pub duplicate_submissions: u64,
}
