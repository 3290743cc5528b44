//! # Ward Directory
//!
//! Reference data: the administrative wards issues are resolved against.
//!
//! The directory is seeded once, when empty, and is otherwise read-only for
//! this engine. There is no update or delete; ward management belongs to an
//! external system.

use crate::primitives::MIN_POLYGON_VERTICES;
use crate::{CivicError, GeoPoint, Ward, WardId, geometry};
use std::collections::BTreeSet;

/// Durable ward reference data.
pub trait WardDirectory {
    /// Populate the directory with `wards` if, and only if, it is empty.
    ///
    /// Returns `true` when the wards were written, `false` when the directory
    /// already held data. All wards are written atomically or none are.
    fn seed_if_empty(&self, wards: &[Ward]) -> Result<bool, CivicError>;

    /// All wards in seed order.
    fn all_wards(&self) -> Result<Vec<Ward>, CivicError>;

    /// Wards belonging to one zone, in seed order.
    fn wards_in_zone(&self, zone: &str) -> Result<Vec<Ward>, CivicError>;

    /// Look up a single ward.
    fn ward(&self, id: WardId) -> Result<Option<Ward>, CivicError>;

    /// Number of seeded wards.
    fn ward_count(&self) -> Result<u64, CivicError>;

    /// Resolve the ward containing `point` against the seeded wards.
    fn resolve(&self, point: &GeoPoint) -> Result<Option<WardId>, CivicError> {
        let wards = self.all_wards()?;
        Ok(geometry::locate(point, &wards))
    }
}

/// Check a seed batch before any of it is written.
///
/// Rejects duplicate ids, blank names and boundaries that cannot enclose an
/// area.
pub fn validate_seed(wards: &[Ward]) -> Result<(), CivicError> {
    let mut seen = BTreeSet::new();
    for ward in wards {
        if !seen.insert(ward.id) {
            return Err(CivicError::Validation(format!(
                "duplicate ward id {} in seed data",
                ward.id
            )));
        }
        if ward.name.trim().is_empty() {
            return Err(CivicError::Validation(format!(
                "ward {} has no name",
                ward.id
            )));
        }
        if ward.boundary.len() < MIN_POLYGON_VERTICES {
            return Err(CivicError::Validation(format!(
                "ward {} boundary has {} vertices, need at least {}",
                ward.id,
                ward.boundary.len(),
                MIN_POLYGON_VERTICES
            )));
        }
        for &(lat, lng) in &ward.boundary {
            GeoPoint::new(lat, lng).validate()?;
        }
    }
    Ok(())
}

/// Built-in sample data: two Vadodara wards in Zone A.
#[must_use]
pub fn sample_wards() -> Vec<Ward> {
    vec![
        Ward {
            id: WardId(1),
            name: "Ward 1 - Alkapuri".to_string(),
            zone: "Zone A".to_string(),
            engineer: "Eng. Patel".to_string(),
            boundary: vec![
                (22.3072, 73.1812),
                (22.3100, 73.1850),
                (22.3050, 73.1900),
                (22.3020, 73.1860),
            ],
        },
        Ward {
            id: WardId(2),
            name: "Ward 2 - Fatehgunj".to_string(),
            zone: "Zone A".to_string(),
            engineer: "Eng. Shah".to_string(),
            boundary: vec![
                (22.3100, 73.1850),
                (22.3150, 73.1900),
                (22.3120, 73.1950),
                (22.3080, 73.1920),
            ],
        },
    ]
}
