//! Grouping unordered stop records into routes.
//!
//! Run with: cargo run --example route_listing

use fleet_tracker::{group, overview, Stop};

fn stop(id: &str, trip: Option<&str>, sort: Option<f64>, lat: f64, lng: f64, name: &str) -> Stop {
    Stop {
        id: id.to_string(),
        route_trip_id: trip.map(str::to_string),
        sort_key: sort,
        latitude: Some(lat),
        longitude: Some(lng),
        name: name.to_string(),
    }
}

fn main() {
    // Stops arrive in whatever order the API stored them
    let stops = vec![
        stop("7", Some("K1"), Some(3.0), -6.2297, 106.8295, "Halte Semanggi"),
        stop("3", Some("K2"), Some(1.0), -6.2615, 106.8106, "Halte Blok M"),
        stop("1", Some("K1"), Some(1.0), -6.1754, 106.8272, "Halte Monas"),
        stop("9", None, Some(1.0), -6.2000, 106.8000, "Halte Tanpa Rute"),
        stop("4", Some("K1"), Some(2.0), -6.1951, 106.8230, "Halte Bundaran HI"),
        stop("5", Some("K2"), Some(2.0), -6.2443, 106.8004, "Halte CSW"),
        stop("6", Some("K2"), None, -6.2250, 106.8000, "Halte Senayan"),
    ];

    let routes = group(&stops);
    println!("Route Listing Example\n");
    println!("{} stops -> {} routes\n", stops.len(), routes.len());

    for line in overview(&routes) {
        println!("Route {}: {} stops, {:.2} km", line.trip_id, line.stop_count, line.distance_km);
        for (i, s) in routes[&line.trip_id].stops.iter().enumerate() {
            println!("  {}. {}", i + 1, s.name);
        }
        println!();
    }
}
