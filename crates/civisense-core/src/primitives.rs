//! # Engine Primitives
//!
//! Hardcoded limits and constants for the CiviSense capture engine.
//! These are compiled into the binary and immutable at runtime.

/// Default bound on a single-shot geolocation request, in milliseconds.
///
/// Matches the 10 second timeout field devices are configured with.
pub const DEFAULT_LOCATION_TIMEOUT_MS: u64 = 10_000;

/// Default bound on a single transmit call to the remote authority, in milliseconds.
pub const DEFAULT_TRANSMIT_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of photos attached to one issue.
pub const MAX_PHOTOS: usize = 8;

/// Maximum size of a single photo (5 MB).
///
/// Larger images are rejected at capture time rather than at sync time, so a
/// queued issue can never be too large to transmit.
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

/// Maximum length of a user-authored description, in bytes.
pub const MAX_DESCRIPTION_LENGTH: usize = 4096;

/// Maximum length of the opaque author reference.
pub const MAX_AUTHOR_REF_LENGTH: usize = 128;

/// Minimum number of vertices for a ward boundary to enclose anything.
pub const MIN_POLYGON_VERTICES: usize = 3;
