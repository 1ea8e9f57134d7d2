//! # Geographic Utilities
//!
//! Distance and map helpers shared by trip aggregation, route reconstruction
//! and the live fleet view.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance_km`] | Great-circle distance between two coordinate pairs |
//! | [`distance_between`] | Same, over two [`GpsPoint`]s |
//! | [`path_length_km`] | Length of a sequence of points in kilometers |
//! | [`initial_bearing`] | Initial bearing from one point toward another |
//! | [`compute_bounds`] | Bounding box of a set of points |
//! | [`compute_center`] | Centroid of a set of points |
//! | [`map_center`] | Where a map should center for a set of positions |
//!
//! ## Example
//!
//! ```rust
//! use fleet_tracker::{GpsPoint, geo_utils};
//!
//! let track = vec![
//!     GpsPoint::new(-6.2000, 106.8166),
//!     GpsPoint::new(-6.2100, 106.8200),
//!     GpsPoint::new(-6.2250, 106.8300),
//! ];
//!
//! let length = geo_utils::path_length_km(track.iter().copied());
//! println!("Path length: {:.2} km", length);
//!
//! let bounds = geo_utils::compute_bounds(&track).unwrap();
//! println!("Bounds: {:.4} to {:.4}", bounds.min_lat, bounds.max_lat);
//! ```
//!
//! ## Algorithm Notes
//!
//! Distances use the haversine formula on a sphere of radius 6,371 km in
//! double precision. Nothing here rounds; formatting belongs to [`crate::report`].
//! Inputs are not validated: a NaN coordinate yields a NaN distance, so
//! callers filter with [`GpsPoint::is_valid`] first.

use geo::{Bearing, BoundingRect, Centroid, Haversine, MultiPoint, Point};
use crate::{Bounds, GpsPoint};

/// Mean Earth radius used for all distances, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Map center used when no vehicle or point has a usable position.
pub const DEFAULT_CENTER: GpsPoint = GpsPoint {
    latitude: -6.306393,
    longitude: 106.888775,
};

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in kilometers between two coordinate pairs given in
/// decimal degrees.
///
/// # Example
///
/// ```rust
/// use fleet_tracker::geo_utils::haversine_distance_km;
///
/// // One degree of latitude is about 111.19 km
/// let d = haversine_distance_km(-6.2, 106.816666, -5.2, 106.816666);
/// assert!((d - 111.19).abs() < 0.5);
/// ```
#[inline]
pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Great-circle distance in kilometers between two GPS points.
#[inline]
pub fn distance_between(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    haversine_distance_km(p1.latitude, p1.longitude, p2.latitude, p2.longitude)
}

/// Total length of a path in kilometers, summing consecutive legs in the
/// order given. Empty or single-point paths return 0.0.
pub fn path_length_km<I>(points: I) -> f64
where
    I: IntoIterator<Item = GpsPoint>,
{
    let mut iter = points.into_iter();
    let Some(mut prev) = iter.next() else {
        return 0.0;
    };

    let mut total = 0.0;
    for curr in iter {
        total += distance_between(&prev, &curr);
        prev = curr;
    }
    total
}

/// Initial bearing in degrees from `from` toward `to`, clockwise from north,
/// normalized to `[0, 360)`.
pub fn initial_bearing(from: &GpsPoint, to: &GpsPoint) -> f64 {
    let origin = Point::new(from.longitude, from.latitude);
    let destination = Point::new(to.longitude, to.latitude);
    Haversine::bearing(origin, destination).rem_euclid(360.0)
}

// =============================================================================
// Bounds and Centers
// =============================================================================

fn to_multi_point(points: &[GpsPoint]) -> MultiPoint<f64> {
    points
        .iter()
        .filter(|p| p.is_valid())
        .map(|p| Point::new(p.longitude, p.latitude))
        .collect::<Vec<_>>()
        .into()
}

/// Bounding box of the valid points, or `None` when there are none.
///
/// # Example
///
/// ```rust
/// use fleet_tracker::{GpsPoint, geo_utils};
///
/// let points = vec![
///     GpsPoint::new(-6.30, 106.80),
///     GpsPoint::new(-6.20, 106.90),
///     GpsPoint::new(-6.25, 106.85),
/// ];
///
/// let bounds = geo_utils::compute_bounds(&points).unwrap();
/// assert_eq!(bounds.min_lat, -6.30);
/// assert_eq!(bounds.max_lng, 106.90);
/// ```
pub fn compute_bounds(points: &[GpsPoint]) -> Option<Bounds> {
    let rect = to_multi_point(points).bounding_rect()?;
    Some(Bounds {
        min_lat: rect.min().y,
        max_lat: rect.max().y,
        min_lng: rect.min().x,
        max_lng: rect.max().x,
    })
}

/// Arithmetic centroid of the valid points, or `None` when there are none.
///
/// Fine for a city-sized fleet; tracks crossing the antimeridian will
/// average to the wrong side of the globe.
pub fn compute_center(points: &[GpsPoint]) -> Option<GpsPoint> {
    let centroid = to_multi_point(points).centroid()?;
    Some(GpsPoint::new(centroid.y(), centroid.x()))
}

/// Where a map should center: the first valid position in the input, or
/// [`DEFAULT_CENTER`].
pub fn map_center<I>(positions: I) -> GpsPoint
where
    I: IntoIterator<Item = Option<GpsPoint>>,
{
    positions
        .into_iter()
        .flatten()
        .find(GpsPoint::is_valid)
        .unwrap_or(DEFAULT_CENTER)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_same_point() {
        let p = GpsPoint::new(-6.2, 106.816666);
        assert_eq!(distance_between(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_symmetry() {
        let a = GpsPoint::new(-6.2, 106.816666);
        let b = GpsPoint::new(-6.9175, 107.6191); // Bandung
        assert_eq!(distance_between(&a, &b), distance_between(&b, &a));
    }

    #[test]
    fn test_one_degree_latitude() {
        let d = haversine_distance_km(-6.2, 106.816666, -5.2, 106.816666);
        // 6371 * pi / 180
        assert!(approx_eq(d, 111.19, 111.19 * 0.01));
    }

    #[test]
    fn test_haversine_nan_propagates() {
        assert!(haversine_distance_km(f64::NAN, 0.0, 1.0, 1.0).is_nan());
    }

    #[test]
    fn test_path_length_empty_and_single() {
        assert_eq!(path_length_km(Vec::<GpsPoint>::new()), 0.0);
        assert_eq!(path_length_km(vec![GpsPoint::new(-6.2, 106.8)]), 0.0);
    }

    #[test]
    fn test_path_length_sums_legs() {
        let a = GpsPoint::new(0.0, 0.0);
        let b = GpsPoint::new(0.0, 1.0);
        let c = GpsPoint::new(1.0, 1.0);
        let total = path_length_km(vec![a, b, c]);
        assert!(approx_eq(total, distance_between(&a, &b) + distance_between(&b, &c), 1e-9));
    }

    #[test]
    fn test_initial_bearing_cardinal() {
        let origin = GpsPoint::new(0.0, 0.0);
        assert!(approx_eq(initial_bearing(&origin, &GpsPoint::new(1.0, 0.0)), 0.0, 0.01));
        assert!(approx_eq(initial_bearing(&origin, &GpsPoint::new(0.0, 1.0)), 90.0, 0.01));
        assert!(approx_eq(initial_bearing(&origin, &GpsPoint::new(-1.0, 0.0)), 180.0, 0.01));
        assert!(approx_eq(initial_bearing(&origin, &GpsPoint::new(0.0, -1.0)), 270.0, 0.01));
    }

    #[test]
    fn test_compute_bounds_skips_invalid() {
        let points = vec![
            GpsPoint::new(-6.30, 106.80),
            GpsPoint::new(f64::NAN, 0.0),
            GpsPoint::new(-6.20, 106.90),
        ];
        let bounds = compute_bounds(&points).unwrap();
        assert_eq!(bounds.min_lat, -6.30);
        assert_eq!(bounds.max_lat, -6.20);
        assert_eq!(bounds.min_lng, 106.80);
        assert_eq!(bounds.max_lng, 106.90);
        assert!(compute_bounds(&[]).is_none());
    }

    #[test]
    fn test_compute_center() {
        let points = vec![GpsPoint::new(-6.30, 106.80), GpsPoint::new(-6.20, 106.90)];
        let center = compute_center(&points).unwrap();
        assert!(approx_eq(center.latitude, -6.25, 1e-9));
        assert!(approx_eq(center.longitude, 106.85, 1e-9));
        assert!(compute_center(&[]).is_none());
    }

    #[test]
    fn test_map_center_fallback() {
        assert_eq!(map_center(vec![None, None]), DEFAULT_CENTER);
        let first = GpsPoint::new(-6.1, 106.7);
        assert_eq!(
            map_center(vec![None, Some(GpsPoint::new(f64::NAN, 0.0)), Some(first)]),
            first
        );
    }
}
