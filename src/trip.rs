//! Trip statistics over a vehicle's historical track points.
//!
//! All functions here are pure and take the points in the order the data
//! source delivered them. They never re-sort: a caller that cannot vouch for
//! chronological order should run [`check_chronological`] first, or sort
//! explicitly with [`sorted_by_time`].
//!
//! Points with a missing or out-of-range coordinate are skipped for distance;
//! points with a missing timestamp are skipped for duration. Both still count
//! toward [`TripSummary::point_count`].

use serde::Serialize;

use crate::error::TripError;
use crate::geo_utils::path_length_km;
use crate::time::minutes_between;
use crate::{TrackPoint, TripWindow};

/// Aggregate statistics for one trip window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TripSummary {
    pub total_distance_km: f64,
    /// Last minus first timestamp; negative if the input runs backwards
    pub total_time_minutes: f64,
    /// 0 when the duration is 0
    pub average_speed_kmh: f64,
    pub point_count: usize,
}

/// Distance in kilometers along the points with usable positions.
pub fn total_distance(points: &[TrackPoint]) -> f64 {
    path_length_km(points.iter().filter_map(TrackPoint::position))
}

/// Minutes between the first and last timestamped points.
///
/// Returns 0 with fewer than two timestamps. Not clamped: out-of-order input
/// produces a negative duration.
pub fn total_time_minutes(points: &[TrackPoint]) -> f64 {
    let mut stamps = points.iter().filter_map(|p| p.timestamp);
    let Some(first) = stamps.next() else {
        return 0.0;
    };
    match stamps.last() {
        Some(last) => minutes_between(first, last),
        None => 0.0,
    }
}

fn speed_kmh(distance_km: f64, minutes: f64) -> f64 {
    if minutes == 0.0 {
        0.0
    } else {
        distance_km / (minutes / 60.0)
    }
}

/// Average speed in km/h over the trip; 0 when the duration is 0.
pub fn average_speed_kmh(points: &[TrackPoint]) -> f64 {
    speed_kmh(total_distance(points), total_time_minutes(points))
}

/// Summarize a trip: distance, duration, average speed and point count.
///
/// # Example
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use fleet_tracker::{summarize, TrackPoint};
///
/// let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
/// let points = vec![
///     TrackPoint::new(0.0, 0.0, t0, 0.0),
///     TrackPoint::new(0.0, 0.0, t0 + Duration::minutes(10), 0.0),
/// ];
/// let summary = summarize(&points);
/// assert_eq!(summary.total_distance_km, 0.0);
/// assert_eq!(summary.total_time_minutes, 10.0);
/// assert_eq!(summary.point_count, 2);
/// ```
pub fn summarize(points: &[TrackPoint]) -> TripSummary {
    let total_distance_km = total_distance(points);
    let total_time_minutes = total_time_minutes(points);

    TripSummary {
        total_distance_km,
        total_time_minutes,
        average_speed_kmh: speed_kmh(total_distance_km, total_time_minutes),
        point_count: points.len(),
    }
}

/// Verify that timestamps never decrease. Points without a timestamp are
/// ignored; equal timestamps are allowed.
pub fn check_chronological(points: &[TrackPoint]) -> Result<(), TripError> {
    let mut previous = None;
    for (index, point) in points.iter().enumerate() {
        let Some(ts) = point.timestamp else { continue };
        if previous.is_some_and(|prev| ts < prev) {
            return Err(TripError::OutOfOrder { index });
        }
        previous = Some(ts);
    }
    Ok(())
}

/// Summarize only if the points are chronological.
pub fn summarize_checked(points: &[TrackPoint]) -> Result<TripSummary, TripError> {
    check_chronological(points)?;
    Ok(summarize(points))
}

/// A copy of the points sorted by timestamp (stable; untimestamped points
/// go last, in their original relative order).
pub fn sorted_by_time(points: &[TrackPoint]) -> Vec<TrackPoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| (p.timestamp.is_none(), p.timestamp));
    sorted
}

/// Summarize several trip windows.
pub fn summarize_many(windows: &[TripWindow]) -> Vec<TripSummary> {
    windows.iter().map(TripWindow::summary).collect()
}

/// Summarize several trip windows using parallel processing.
///
/// Same result as [`summarize_many`]; worthwhile for fleet-wide reports
/// spanning many vehicles.
#[cfg(feature = "parallel")]
pub fn summarize_many_parallel(windows: &[TripWindow]) -> Vec<TripSummary> {
    use rayon::prelude::*;

    windows.par_iter().map(TripWindow::summary).collect()
}
