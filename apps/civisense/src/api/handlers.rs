//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    ledger::Admission,
    types::{HealthResponse, IssueFilter, SubmitResponse, validate_submission},
};
use crate::sync::IssuePayload;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// SUBMIT HANDLER
// =============================================================================

/// Accept one issue.
///
/// `201 Created` for a new idempotency key, `200 OK` for a resubmission of
/// a key already held, `400 Bad Request` for invalid payloads.
pub async fn submit_handler(
    State(state): State<AppState>,
    Json(payload): Json<IssuePayload>,
) -> impl IntoResponse {
    if let Err(e) = validate_submission(&payload) {
        tracing::warn!("Rejected issue {}: {}", payload.idempotency_key, e);
        return (
            StatusCode::BAD_REQUEST,
            Json(SubmitResponse::error(format!("Invalid issue: {}", e))),
        );
    }

    let key = payload.idempotency_key.clone();
    let mut ledger = state.ledger.write().await;
    match ledger.admit(payload, Utc::now()) {
        Admission::New(receipt) => {
            tracing::info!("Accepted issue {} as receipt {}", key, receipt);
            (
                StatusCode::CREATED,
                Json(SubmitResponse::accepted(receipt, false)),
            )
        }
        Admission::Duplicate(receipt) => {
            tracing::info!("Duplicate submission of {} (receipt {})", key, receipt);
            (StatusCode::OK, Json(SubmitResponse::accepted(receipt, true)))
        }
    }
}

// =============================================================================
// LIST HANDLER
// =============================================================================

/// List accepted issues, optionally filtered by ward, category or author.
pub async fn list_handler(
    State(state): State<AppState>,
    Query(filter): Query<IssueFilter>,
) -> impl IntoResponse {
    let ledger = state.ledger.read().await;
    (StatusCode::OK, Json(ledger.list(&filter)))
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get ledger status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ledger = state.ledger.read().await;
    (StatusCode::OK, Json(ledger.status()))
}
