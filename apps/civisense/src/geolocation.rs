//! # Geolocation
//!
//! Single-shot location acquisition with a bounded wait.
//!
//! A provider is asked for one fix. If it fails, or does not answer within
//! the timeout, the capture session records a `GeolocationError` and stays in
//! its current phase; nothing entered so far is lost.

use civisense_core::{
    CaptureSession, CivicError, GeoPoint, GeolocationError, WardDirectory, WardId,
};
use std::future::Future;
use std::time::Duration;

/// A source of location fixes.
pub trait GeolocationProvider: Send + Sync {
    /// Request the current position once.
    fn current_position(&self) -> impl Future<Output = Result<GeoPoint, GeolocationError>> + Send;
}

/// Provider that always reports the same position.
///
/// Used by the CLI, where coordinates are passed as arguments.
#[derive(Debug, Clone)]
pub struct FixedPosition(pub GeoPoint);

impl GeolocationProvider for FixedPosition {
    async fn current_position(&self) -> Result<GeoPoint, GeolocationError> {
        Ok(self.0.clone())
    }
}

/// Ask `provider` for a fix, giving up after `timeout`.
pub async fn request_fix<P>(provider: &P, timeout: Duration) -> Result<GeoPoint, GeolocationError>
where
    P: GeolocationProvider + ?Sized,
{
    match tokio::time::timeout(timeout, provider.current_position()).await {
        Ok(result) => result,
        Err(_) => Err(GeolocationError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Acquire a fix and record it on `session`, resolving its ward.
///
/// On failure the session keeps its phase and remembers the error.
pub async fn acquire_location<P, D>(
    session: &mut CaptureSession,
    provider: &P,
    wards: &D,
    timeout: Duration,
) -> Result<Option<WardId>, CivicError>
where
    P: GeolocationProvider + ?Sized,
    D: WardDirectory + ?Sized,
{
    match request_fix(provider, timeout).await {
        Ok(point) => {
            let ward = session.record_fix(point, wards)?;
            match ward {
                Some(id) => tracing::debug!("Location fix resolved to ward {}", id),
                None => tracing::info!("Location fix is outside every known ward"),
            }
            Ok(ward)
        }
        Err(e) => {
            tracing::warn!("Location request failed: {}", e);
            Err(session.record_location_error(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Denied;

    impl GeolocationProvider for Denied {
        async fn current_position(&self) -> Result<GeoPoint, GeolocationError> {
            Err(GeolocationError::PermissionDenied)
        }
    }

    #[tokio::test]
    async fn fixed_position_answers_immediately() {
        let provider = FixedPosition(GeoPoint::new(22.3080, 73.1830));
        let point = request_fix(&provider, Duration::from_millis(50))
            .await
            .expect("fix");
        assert_eq!(point, GeoPoint::new(22.3080, 73.1830));
    }

    #[tokio::test]
    async fn provider_error_passes_through() {
        let result = request_fix(&Denied, Duration::from_secs(1)).await;
        assert_eq!(result, Err(GeolocationError::PermissionDenied));
    }
}
