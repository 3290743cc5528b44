//! # Geometry Resolver
//!
//! Point-in-polygon ward resolution by ray casting.
//!
//! Latitude is the parity axis and longitude the crossing axis: for each
//! polygon edge `(p[i], p[j])`, with `j` the previous vertex, membership
//! toggles when the edge straddles the query longitude and the latitude
//! intercept of the edge at that longitude lies above the query latitude.
//!
//! ## Overlaps
//!
//! Regions are evaluated in iteration order and the FIRST match wins. Valid
//! ward partitions never overlap; when input data does, the earlier ward is
//! returned and the overlap is left as is.

// Coordinates are floating point by nature; the workspace ban on float
// arithmetic is lifted for this module only.
#![allow(clippy::float_arithmetic)]

use crate::primitives::MIN_POLYGON_VERTICES;
use crate::{GeoPoint, Ward, WardId};

/// Ray-casting parity test for one polygon.
///
/// `polygon` holds `(lat, lng)` vertices. Polygons with fewer than three
/// vertices contain nothing. Edges whose two longitudes are equal never
/// straddle the query longitude and are skipped, so the intercept division
/// never divides by zero.
#[must_use]
pub fn contains(polygon: &[(f64, f64)], lat: f64, lng: f64) -> bool {
    if polygon.len() < MIN_POLYGON_VERTICES {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (lat_i, lng_i) = polygon[i];
        let (lat_j, lng_j) = polygon[j];

        if lng_i != lng_j && ((lng_i > lng) != (lng_j > lng)) {
            let intercept = (lat_j - lat_i) * (lng - lng_i) / (lng_j - lng_i) + lat_i;
            if lat < intercept {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Return the id of the first ward whose boundary contains `point`.
///
/// `None` means "unresolved ward"; callers store `ward_id = None` and the
/// capture carries on.
#[must_use]
pub fn locate<'a, I>(point: &GeoPoint, wards: I) -> Option<WardId>
where
    I: IntoIterator<Item = &'a Ward>,
{
    wards
        .into_iter()
        .find(|ward| contains(&ward.boundary, point.lat, point.lng))
        .map(|ward| ward.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wards::sample_wards;

    fn square(id: u32, min_lat: f64, min_lng: f64, size: f64) -> Ward {
        Ward {
            id: WardId(id),
            name: format!("Square {}", id),
            zone: "Test".to_string(),
            engineer: String::new(),
            boundary: vec![
                (min_lat, min_lng),
                (min_lat + size, min_lng),
                (min_lat + size, min_lng + size),
                (min_lat, min_lng + size),
            ],
        }
    }

    #[test]
    fn sample_point_resolves_to_alkapuri() {
        let wards = sample_wards();
        let ward = locate(&GeoPoint::new(22.3080, 73.1830), &wards);
        assert_eq!(ward, Some(WardId(1)));
        assert_eq!(wards[0].name, "Ward 1 - Alkapuri");
    }

    #[test]
    fn point_in_second_sample_ward() {
        let wards = sample_wards();
        let ward = locate(&GeoPoint::new(22.3115, 73.1910), &wards);
        assert_eq!(ward, Some(WardId(2)));
    }

    #[test]
    fn point_outside_all_wards() {
        let wards = sample_wards();
        assert_eq!(locate(&GeoPoint::new(22.4000, 73.3000), &wards), None);
        assert_eq!(locate(&GeoPoint::new(0.0, 0.0), &wards), None);
    }

    #[test]
    fn overlapping_wards_first_match_wins() {
        let wards = vec![square(10, 0.0, 0.0, 2.0), square(20, 1.0, 1.0, 2.0)];
        assert_eq!(locate(&GeoPoint::new(1.5, 1.5), &wards), Some(WardId(10)));

        let reversed: Vec<Ward> = wards.into_iter().rev().collect();
        assert_eq!(
            locate(&GeoPoint::new(1.5, 1.5), &reversed),
            Some(WardId(20))
        );
    }

    #[test]
    fn degenerate_polygons_contain_nothing() {
        assert!(!contains(&[], 0.0, 0.0));
        assert!(!contains(&[(0.0, 0.0), (1.0, 1.0)], 0.5, 0.5));
        // Every vertex on one longitude: all edges skipped.
        assert!(!contains(&[(0.0, 1.0), (1.0, 1.0), (2.0, 1.0)], 1.0, 1.0));
    }

    #[test]
    fn concave_polygon_notch_is_outside() {
        // U shape opening towards higher latitude.
        let u = vec![
            (0.0, 0.0),
            (0.0, 3.0),
            (3.0, 3.0),
            (3.0, 2.0),
            (1.0, 2.0),
            (1.0, 1.0),
            (3.0, 1.0),
            (3.0, 0.0),
        ];
        assert!(contains(&u, 0.5, 1.5));
        assert!(!contains(&u, 2.0, 1.5));
        assert!(contains(&u, 2.0, 0.5));
        assert!(contains(&u, 2.0, 2.5));
    }
}
