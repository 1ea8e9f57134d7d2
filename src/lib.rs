//! # Fleet Tracker
//!
//! Position classification and trip analytics for a fleet-monitoring dashboard.
//!
//! This library provides:
//! - Haversine distances and map helpers over raw GPS fixes
//! - Live activity classification (active / moving / stopped) per vehicle
//! - Trip summaries (distance, duration, average speed) over historical traces
//! - Route reconstruction from unordered stop records
//! - A polling session that keeps a fleet view fresh without request storms
//! - Validated history queries and tabular trip reports
//!
//! ## Features
//!
//! - **`http`** - Enable the reqwest client for the tracking API (default)
//! - **`parallel`** - Enable parallel batch summaries with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use fleet_tracker::{summarize, TrackPoint};
//!
//! let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
//! let points = vec![
//!     TrackPoint::new(-6.2000, 106.8166, start, 0.0),
//!     TrackPoint::new(-6.2100, 106.8166, start + Duration::minutes(2), 35.0),
//!     TrackPoint::new(-6.2200, 106.8200, start + Duration::minutes(5), 40.0),
//! ];
//!
//! let summary = summarize(&points);
//! println!(
//!     "{:.2} km in {:.0} min ({:.1} km/h)",
//!     summary.total_distance_km, summary.total_time_minutes, summary.average_speed_kmh
//! );
//! assert_eq!(summary.point_count, 3);
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod activity;
pub mod error;
pub mod geo_utils;
pub mod history;
pub mod polling;
pub mod report;
pub mod routes;
pub mod source;
pub mod time;
pub mod trip;
pub mod wire;

// HTTP client for the tracking API
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{ClientConfig, TrackingClient};

pub use activity::{
    classify, classify_snapshot, ActivityConfig, ActivityStatus, ClassificationRule, StatusCounts,
};
pub use error::{FleetError, QueryError, TripError};
pub use history::{fetch_trip_summaries, BatchSummary, HistoryLoader, LoadOutcome, TripQuery};
pub use polling::{
    Clock, FleetView, PollingConfig, PollingSession, RefreshMode, RefreshOutcome, SessionState,
    SystemClock, TickReport,
};
pub use report::TripReport;
pub use routes::{group, overview, route_distance, Route, RouteMap, RouteOverview};
pub use source::TrackingSource;
pub use trip::{summarize, TripSummary};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use fleet_tracker::GpsPoint;
/// let point = GpsPoint::new(-6.2000, 106.8166); // Jakarta
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box around a set of positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// One timestamped GPS fix from a vehicle's history.
///
/// Coordinates and timestamp are optional because upstream records can carry
/// missing or non-numeric fields. Such a point still counts toward
/// `point_count` but is skipped by distance and duration computations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackPoint {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Speed in km/h as reported by the tracker
    pub speed: f64,
    /// Fix validity flag as reported by the receiver
    pub valid: bool,
}

impl TrackPoint {
    /// Create a well-formed, valid track point.
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>, speed: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            timestamp: Some(timestamp),
            speed,
            valid: true,
        }
    }

    /// The fix position, if both coordinates are present and in range.
    pub fn position(&self) -> Option<GpsPoint> {
        let point = GpsPoint::new(self.latitude?, self.longitude?);
        point.is_valid().then_some(point)
    }
}

/// Most recent known state of one vehicle.
///
/// Replaced wholesale on every poll; there is no field-level merge between
/// successive snapshots of the same device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSnapshot {
    pub device_id: String,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    /// Last reported speed in km/h (0 when missing)
    pub last_speed: f64,
    pub last_update: Option<DateTime<Utc>>,
}

impl VehicleSnapshot {
    /// The last known position, if both coordinates are usable.
    pub fn position(&self) -> Option<GpsPoint> {
        let point = GpsPoint::new(self.last_latitude?, self.last_longitude?);
        point.is_valid().then_some(point)
    }

    /// Device id for display; blank ids render as "Unknown".
    pub fn display_id(&self) -> &str {
        if self.device_id.trim().is_empty() {
            "Unknown"
        } else {
            &self.device_id
        }
    }
}

/// One historical query result for a single vehicle.
///
/// `points` keeps the order the data source returned. Aggregations assume it
/// is chronological; see [`trip::check_chronological`] to verify that.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripWindow {
    pub device_id: String,
    /// Query start in the API's local time
    pub start_time: NaiveDateTime,
    /// Query end in the API's local time
    pub end_time: NaiveDateTime,
    pub points: Vec<TrackPoint>,
}

impl TripWindow {
    /// Create an empty window (the "no data" answer for a query).
    pub fn empty(device_id: &str, start_time: NaiveDateTime, end_time: NaiveDateTime) -> Self {
        Self {
            device_id: device_id.to_string(),
            start_time,
            end_time,
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Summarize the window's points.
    pub fn summary(&self) -> TripSummary {
        trip::summarize(&self.points)
    }

    /// First point with a usable position.
    pub fn start_point(&self) -> Option<GpsPoint> {
        self.points.iter().find_map(TrackPoint::position)
    }

    /// Last point with a usable position.
    pub fn end_point(&self) -> Option<GpsPoint> {
        self.points.iter().rev().find_map(TrackPoint::position)
    }
}

/// One point of interest on a route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stop {
    pub id: String,
    /// Trip the stop belongs to; stops without one are not part of any route
    pub route_trip_id: Option<String>,
    /// Position within the trip (ascending)
    pub sort_key: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub name: String,
}

impl Stop {
    /// The stop position, if both coordinates are usable.
    pub fn position(&self) -> Option<GpsPoint> {
        let point = GpsPoint::new(self.latitude?, self.longitude?);
        point.is_valid().then_some(point)
    }
}

// ============================================================================
// Tests
// ============================================================================
