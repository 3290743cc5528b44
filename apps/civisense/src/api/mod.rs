//! # Authority HTTP API Module
//!
//! A reference remote authority built on axum. It receives issues from
//! field devices and keeps them in memory, keyed by idempotency key.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /issues` - Submit an issue (`201` new, `200` duplicate)
//! - `GET /issues` - List accepted issues (`?ward=`, `?category=`, `?author=`)
//! - `GET /status` - Ledger totals
//!
//! ## Configuration (Environment Variables)
//!
//! - `CIVISENSE_CORS_ORIGINS`: Comma-separated browser origins allowed to read
//!   the ledger, or "*" for any (default: none, devices need no CORS)
//! - `CIVISENSE_DEVICE_QUOTA`: Submissions per minute per device (default: 600,
//!   0 disables)

mod handlers;
mod ledger;
mod middleware;
mod types;

pub use handlers::{health_handler, list_handler, status_handler, submit_handler};
pub use ledger::{Admission, Ledger, Received};
pub use middleware::{
    AUTHOR_HEADER, DEFAULT_DEVICE_QUOTA, DeviceLimiter, create_device_limiter,
    device_quota_from_env,
};
pub use types::{
    HealthResponse, IssueFilter, IssueSummary, StatusResponse, SubmitResponse,
    validate_submission,
};

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
};
use civisense_core::primitives::{MAX_PHOTO_BYTES, MAX_PHOTOS};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Largest accepted request body: every photo at full size, base64-inflated,
/// plus room for the rest of the record.
const MAX_BODY_BYTES: usize = MAX_PHOTOS * MAX_PHOTO_BYTES / 3 * 4 + 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the ledger.
#[derive(Clone, Default)]
pub struct AppState {
    pub ledger: Arc<RwLock<Ledger>>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Router settings normally taken from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Raw `CIVISENSE_CORS_ORIGINS` value.
    pub cors_origins: Option<String>,
    /// Submissions per minute per device; 0 disables the quota.
    pub device_quota: u32,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            cors_origins: None,
            device_quota: DEFAULT_DEVICE_QUOTA,
        }
    }
}

impl ServerOptions {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            cors_origins: std::env::var("CIVISENSE_CORS_ORIGINS").ok(),
            device_quota: device_quota_from_env(),
        }
    }
}

// =============================================================================
// DASHBOARD CORS
// =============================================================================

/// CORS for browser dashboards that read the ledger.
///
/// Returns `None` when no origins are configured. Browsers only get `GET`;
/// submissions come from devices.
fn dashboard_cors(origins: Option<&str>) -> Option<CorsLayer> {
    let origins = origins?.trim();
    let allow = if origins == "*" {
        tracing::warn!("CORS: any origin may read the ledger");
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("CORS: ignoring origin '{}': {}", o, e);
                    None
                }
            })
            .collect();
        if parsed.is_empty() {
            tracing::warn!("CORS: no usable origins in CIVISENSE_CORS_ORIGINS");
            return None;
        }
        tracing::info!("CORS: {} dashboard origin(s) may read the ledger", parsed.len());
        AllowOrigin::list(parsed)
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow)
            .allow_methods([Method::GET]),
    )
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the router using environment configuration.
pub fn create_router(state: AppState) -> Router {
    create_router_with(state, &ServerOptions::from_env())
}

/// Create the router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. Dashboard CORS (if origins are configured)
/// 3. Body limit
/// 4. Per-device submission quota (if enabled)
pub fn create_router_with(state: AppState, options: &ServerOptions) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route(
            "/issues",
            get(handlers::list_handler).post(handlers::submit_handler),
        );

    if options.device_quota > 0 {
        tracing::info!(
            "Device quota enabled: {} submissions/minute per author",
            options.device_quota
        );
        router = router.layer(axum_middleware::from_fn_with_state(
            create_device_limiter(options.device_quota),
            middleware::device_quota_middleware,
        ));
    } else {
        tracing::info!("Device quota disabled");
    }

    router = router.layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES));
    if let Some(cors) = dashboard_cors(options.cors_origins.as_deref()) {
        router = router.layer(cors);
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the authority server and run until Ctrl+C.
pub async fn run_server(addr: &str) -> std::io::Result<()> {
    let router = create_router(AppState::new());

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("CiviSense authority listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for shutdown signal: {}", e);
            }
        })
        .await
}
