//! Route reconstruction from unordered stop records.
//!
//! The routes endpoint returns every stop of every trip in one flat list.
//! [`group`] buckets them by trip id and orders each bucket by sort key, so
//! the result depends only on the stops themselves and not on arrival order
//! (which only breaks ties between equal keys).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::geo_utils::path_length_km;
use crate::{GpsPoint, Stop};

/// An ordered sequence of stops belonging to one trip id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub trip_id: String,
    pub stops: Vec<Stop>,
}

impl Route {
    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    /// Stop positions in route order, skipping stops without usable coordinates.
    pub fn path(&self) -> Vec<GpsPoint> {
        self.stops.iter().filter_map(Stop::position).collect()
    }

    /// Position of the first stop that has one (where a map centers).
    pub fn first_position(&self) -> Option<GpsPoint> {
        self.stops.iter().find_map(Stop::position)
    }
}

/// Routes keyed by trip id, iterated in lexical trip id order ("10" before
/// "2"). Use [`overview`] for a listing in natural order.
pub type RouteMap = BTreeMap<String, Route>;

/// One line of a route selector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteOverview {
    pub trip_id: String,
    pub stop_count: usize,
    pub distance_km: f64,
}

fn trip_id_of(stop: &Stop) -> Option<&str> {
    stop.route_trip_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

/// Natural trip id order: integer ids numerically, then every other id
/// lexically.
pub fn compare_trip_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// Missing keys sort after every present key.
fn compare_sort_keys(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Group stops into routes by trip id, each sorted by sort key.
///
/// Stops with a missing or blank trip id are dropped rather than collected
/// into a catch-all route. The sort is stable, so equal keys keep their
/// input order.
///
/// # Example
/// ```
/// use fleet_tracker::{group, Stop};
///
/// let stop = |id: &str, trip: Option<&str>, sort: f64| Stop {
///     id: id.to_string(),
///     route_trip_id: trip.map(str::to_string),
///     sort_key: Some(sort),
///     latitude: Some(-6.2),
///     longitude: Some(106.8),
///     name: format!("Halte {}", id),
/// };
///
/// let routes = group(&[
///     stop("1", Some("A"), 2.0),
///     stop("2", Some("A"), 1.0),
///     stop("3", Some("B"), 1.0),
///     stop("4", None, 1.0),
/// ]);
///
/// assert_eq!(routes.len(), 2);
/// let ids: Vec<&str> = routes["A"].stops.iter().map(|s| s.id.as_str()).collect();
/// assert_eq!(ids, ["2", "1"]);
/// assert_eq!(routes["B"].stop_count(), 1);
/// ```
pub fn group(stops: &[Stop]) -> RouteMap {
    let mut routes = RouteMap::new();
    let mut skipped = 0usize;

    for stop in stops {
        let Some(trip_id) = trip_id_of(stop) else {
            skipped += 1;
            continue;
        };
        routes
            .entry(trip_id.to_string())
            .or_insert_with(|| Route {
                trip_id: trip_id.to_string(),
                stops: Vec::new(),
            })
            .stops
            .push(stop.clone());
    }

    for route in routes.values_mut() {
        route.stops.sort_by(|a, b| compare_sort_keys(a.sort_key, b.sort_key));
    }

    if skipped > 0 {
        log::debug!("[RouteGrouper] Skipped {} stops without a trip id", skipped);
    }

    routes
}

/// Length of a route in kilometers, following its stops in order.
pub fn route_distance(route: &Route) -> f64 {
    path_length_km(route.stops.iter().filter_map(Stop::position))
}

/// Selector lines for every route, in natural trip id order (see
/// [`compare_trip_ids`]).
pub fn overview(routes: &RouteMap) -> Vec<RouteOverview> {
    let mut lines: Vec<RouteOverview> = routes
        .values()
        .map(|route| RouteOverview {
            trip_id: route.trip_id.clone(),
            stop_count: route.stop_count(),
            distance_km: route_distance(route),
        })
        .collect();
    lines.sort_by(|a, b| compare_trip_ids(&a.trip_id, &b.trip_id));
    lines
}
