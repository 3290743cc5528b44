//! # Middleware Module
//!
//! Per-device submission quota for the authority API.
//!
//! Every device tags its submissions with [`AUTHOR_HEADER`]. Each author gets
//! its own bucket, so one runaway device cannot crowd out the rest of the
//! field force. Reads (`GET`) are never counted.
//!
//! ## Configuration
//!
//! - `CIVISENSE_DEVICE_QUOTA`: Submissions per minute per device
//!   (default: 600, 0 disables)

use super::types::SubmitResponse;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    DefaultKeyedRateLimiter, Quota, RateLimiter,
    clock::{Clock, DefaultClock},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Default submissions per minute per device.
pub const DEFAULT_DEVICE_QUOTA: u32 = 600;

/// Header carrying the submitting author's reference.
pub const AUTHOR_HEADER: &str = "x-civisense-author";

/// Bucket for submissions that carry no author header.
const UNTAGGED: &str = "";

// =============================================================================
// DEVICE QUOTA
// =============================================================================

/// Rate limiter keyed by author reference.
pub type DeviceLimiter = Arc<DefaultKeyedRateLimiter<String>>;

/// Create a per-device limiter. The whole minute's quota may arrive as one
/// burst, which is what a device draining its outbox looks like.
pub fn create_device_limiter(per_minute: u32) -> DeviceLimiter {
    let quota = NonZeroU32::new(per_minute)
        .or(NonZeroU32::new(DEFAULT_DEVICE_QUOTA))
        .unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(quota)))
}

/// Read `CIVISENSE_DEVICE_QUOTA`, falling back to the default when unset or
/// unparsable.
pub fn device_quota_from_env() -> u32 {
    std::env::var("CIVISENSE_DEVICE_QUOTA")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_DEVICE_QUOTA)
}

fn author_of(request: &Request<Body>) -> String {
    request
        .headers()
        .get(AUTHOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or(UNTAGGED)
        .to_string()
}

/// Refuse submissions beyond the author's quota with `429` and a
/// `Retry-After` hint. The sync coordinator records such an issue as
/// `sync_failed`, and the next retry cycle resends it.
pub async fn device_quota_middleware(
    State(limiter): State<DeviceLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let author = author_of(&request);
    match limiter.check_key(&author) {
        Ok(()) => next.run(request).await,
        Err(not_until) => {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            let retry_after = wait.as_secs().saturating_add(1);
            tracing::warn!(
                "Device quota exceeded for '{}', retry in {}s",
                author,
                retry_after
            );
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(SubmitResponse::error(format!(
                    "submission quota exceeded for '{}'",
                    author
                ))),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_quota_uses_default() {
        let limiter = create_device_limiter(0);
        for _ in 0..DEFAULT_DEVICE_QUOTA {
            assert!(limiter.check_key(&"fw-1".to_string()).is_ok());
        }
        assert!(limiter.check_key(&"fw-1".to_string()).is_err());
    }

    #[test]
    fn devices_have_separate_buckets() {
        let limiter = create_device_limiter(2);
        let noisy = "fw-noisy".to_string();
        assert!(limiter.check_key(&noisy).is_ok());
        assert!(limiter.check_key(&noisy).is_ok());
        assert!(limiter.check_key(&noisy).is_err());

        assert!(limiter.check_key(&"fw-quiet".to_string()).is_ok());
    }

    #[test]
    fn missing_header_shares_untagged_bucket() {
        let request = Request::post("/issues").body(Body::empty()).expect("request");
        assert_eq!(author_of(&request), UNTAGGED);

        let request = Request::post("/issues")
            .header(AUTHOR_HEADER, " fw-7 ")
            .body(Body::empty())
            .expect("request");
        assert_eq!(author_of(&request), "fw-7");
    }
}
