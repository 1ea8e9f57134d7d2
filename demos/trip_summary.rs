//! Summarizing a trip window and rendering its history report.
//!
//! Run with: cargo run --example trip_summary

use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use fleet_tracker::trip::{check_chronological, sorted_by_time};
use fleet_tracker::{summarize, TrackPoint, TripReport, TripWindow};

fn main() {
    // A morning run south through East Jakarta, reported in UTC
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap();
    let mut points = vec![
        TrackPoint::new(-6.2000, 106.8667, t0, 0.0),
        TrackPoint::new(-6.2150, 106.8700, t0 + Duration::minutes(3), 32.5),
        TrackPoint::new(-6.2400, 106.8750, t0 + Duration::minutes(7), 41.0),
        TrackPoint::new(-6.2700, 106.8820, t0 + Duration::minutes(12), 38.2),
        TrackPoint::new(-6.3063, 106.8887, t0 + Duration::minutes(18), 12.0),
    ];

    // A fix with no latitude is kept in the report but not in the distance
    let mut lost = TrackPoint::new(0.0, 0.0, t0 + Duration::minutes(9), 0.0);
    lost.latitude = None;
    lost.valid = false;
    points.insert(3, lost);

    println!("Trip Summary Example\n");

    match check_chronological(&points) {
        Ok(()) => println!("Points are in time order"),
        Err(e) => {
            println!("{} - sorting", e);
            points = sorted_by_time(&points);
        }
    }

    let summary = summarize(&points);
    println!("Distance:      {:.2} km", summary.total_distance_km);
    println!("Duration:      {:.1} min", summary.total_time_minutes);
    println!("Average speed: {:.1} km/h", summary.average_speed_kmh);
    println!("Points:        {}\n", summary.point_count);

    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let window = TripWindow {
        device_id: "B 1234 XY".to_string(),
        start_time: day.and_hms_opt(8, 0, 0).unwrap(),
        end_time: day.and_hms_opt(9, 0, 0).unwrap(),
        points,
    };

    // Jakarta local time
    let wib = FixedOffset::east_opt(7 * 3600).unwrap();
    match TripReport::from_window(&window, wib) {
        Some(report) => {
            println!("Report: {}.xlsx", report.file_stem(day));
            for row in report.table() {
                println!("  {}", row.join("\t"));
            }
        }
        None => println!("No data to export"),
    }
}
