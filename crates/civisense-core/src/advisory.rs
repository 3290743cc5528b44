//! # Advisory Input
//!
//! Interface to the external suggestion heuristic. Its output is consumed
//! opaquely: it seeds a default priority and a fallback description, and
//! anything the author enters explicitly takes precedence.

use crate::{Category, GeoPoint, Photo, Priority};
use serde::{Deserialize, Serialize};

/// What the advisory collaborator suggests for an in-progress report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub description: String,
    pub priority: Priority,
    /// Free-form estimate such as "2-3 days".
    pub estimated_resolution: String,
}

/// A read-only source of suggestions.
///
/// Implementations must be pure: the same inputs give the same advice.
pub trait Advisor: Send + Sync {
    fn analyze(
        &self,
        photo: Option<&Photo>,
        location: Option<&GeoPoint>,
        category: Option<Category>,
    ) -> Option<Advisory>;
}

/// Advisor that never has anything to say.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdvice;

impl Advisor for NoAdvice {
    fn analyze(
        &self,
        _photo: Option<&Photo>,
        _location: Option<&GeoPoint>,
        _category: Option<Category>,
    ) -> Option<Advisory> {
        None
    }
}
