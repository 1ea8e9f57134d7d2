//! Display strings for the fleet list and the trip history report.
//!
//! Everything here is presentation-boundary formatting: numbers are kept at
//! full precision everywhere else and rounded only when rendered.
//!
//! | Value | Live view | Trip report |
//! |-------|-----------|-------------|
//! | coordinate | 6 decimals, `N/A` if missing | 6 decimals, `-` if missing |
//! | speed | `x.x km/h`, `0 km/h` if unusable | `x.x km/h`, `-` if zero |
//! | distance | | `x.xx km` |
//! | duration | | `N minutes` |

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use crate::activity::{ActivityConfig, ActivityStatus};
use crate::polling::FleetView;
use crate::time::to_local;
use crate::trip::TripSummary;
use crate::{GpsPoint, TrackPoint, TripWindow};

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const REPORT_TITLE: &str = "Vehicle History Report";
const REPORT_COLUMNS: [&str; 6] = ["No", "Timestamp", "Latitude", "Longitude", "Speed", "Valid"];

/// Coordinate with 6 decimals, or `N/A`.
pub fn format_coordinate(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.6}", v),
        _ => "N/A".to_string(),
    }
}

/// Speed with one decimal; unusable values read as standing still.
pub fn format_speed(kmh: f64) -> String {
    if kmh.is_finite() {
        format!("{:.1} km/h", kmh)
    } else {
        "0 km/h".to_string()
    }
}

pub fn format_distance_km(km: f64) -> String {
    format!("{:.2} km", km)
}

pub fn format_minutes(minutes: f64) -> String {
    format!("{:.0} minutes", minutes)
}

/// Local wall-clock time, or `N/A`.
pub fn format_timestamp(instant: Option<DateTime<Utc>>, local_offset: FixedOffset) -> String {
    instant
        .map(|t| to_local(t, local_offset).format(DISPLAY_FORMAT).to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Google Maps link for a position.
pub fn maps_link(point: GpsPoint) -> String {
    format!(
        "https://www.google.com/maps?q={},{}",
        point.latitude, point.longitude
    )
}

/// One line of the fleet list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetRow {
    pub device_id: String,
    pub status: ActivityStatus,
    pub latitude: String,
    pub longitude: String,
    pub speed: String,
    pub last_update: String,
    /// Absent when the vehicle has no usable position
    pub maps_link: Option<String>,
}

/// Fleet list rows in fetch order, classified at `now`.
pub fn fleet_rows(
    view: &FleetView,
    now: DateTime<Utc>,
    config: &ActivityConfig,
    local_offset: FixedOffset,
) -> Vec<FleetRow> {
    view.vehicles
        .iter()
        .map(|v| FleetRow {
            device_id: v.display_id().to_string(),
            status: config.classify_snapshot(v, now),
            latitude: format_coordinate(v.last_latitude),
            longitude: format_coordinate(v.last_longitude),
            speed: format_speed(v.last_speed),
            last_update: format_timestamp(v.last_update, local_offset),
            maps_link: v.position().map(maps_link),
        })
        .collect()
}

/// One track point row of a trip report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub no: usize,
    pub timestamp: String,
    pub latitude: String,
    pub longitude: String,
    pub speed: String,
    pub valid: &'static str,
}

impl ReportRow {
    fn from_point(no: usize, point: &TrackPoint, local_offset: FixedOffset) -> Self {
        let cell = |v: Option<f64>| match v {
            Some(v) if v.is_finite() && v != 0.0 => format!("{:.6}", v),
            _ => "-".to_string(),
        };
        Self {
            no,
            timestamp: point
                .timestamp
                .map(|t| to_local(t, local_offset).format(DISPLAY_FORMAT).to_string())
                .unwrap_or_else(|| "-".to_string()),
            latitude: cell(point.latitude),
            longitude: cell(point.longitude),
            speed: if point.speed.is_finite() && point.speed != 0.0 {
                format!("{:.1} km/h", point.speed)
            } else {
                "-".to_string()
            },
            valid: if point.valid { "Yes" } else { "No" },
        }
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.no.to_string(),
            self.timestamp.clone(),
            self.latitude.clone(),
            self.longitude.clone(),
            self.speed.clone(),
            self.valid.to_string(),
        ]
    }
}

/// Tabular history report for one trip window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripReport {
    pub device_id: String,
    pub period: String,
    pub summary: TripSummary,
    pub rows: Vec<ReportRow>,
}

impl TripReport {
    /// Build a report; `None` when the window has no points to export.
    pub fn from_window(window: &TripWindow, local_offset: FixedOffset) -> Option<Self> {
        if window.is_empty() {
            return None;
        }
        Some(Self {
            device_id: window.device_id.clone(),
            period: format!(
                "{} - {}",
                window.start_time.format(DISPLAY_FORMAT),
                window.end_time.format(DISPLAY_FORMAT)
            ),
            summary: window.summary(),
            rows: window
                .points
                .iter()
                .enumerate()
                .map(|(i, p)| ReportRow::from_point(i + 1, p, local_offset))
                .collect(),
        })
    }

    /// Label/value lines shown above the point table.
    pub fn header(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Vehicle ID:", self.device_id.clone()),
            ("Period:", self.period.clone()),
            ("Total Distance:", format_distance_km(self.summary.total_distance_km)),
            ("Total Time:", format_minutes(self.summary.total_time_minutes)),
            ("Average Speed:", format!("{:.1} km/h", self.summary.average_speed_kmh)),
            ("Total Points:", self.summary.point_count.to_string()),
        ]
    }

    /// The whole report as rows of cells: title, header lines, a blank
    /// spacer, column names, then one row per point.
    pub fn table(&self) -> Vec<Vec<String>> {
        let mut table = Vec::with_capacity(self.rows.len() + 9);
        table.push(vec![REPORT_TITLE.to_string()]);
        table.extend(
            self.header()
                .into_iter()
                .map(|(label, value)| vec![label.to_string(), value]),
        );
        table.push(vec![String::new()]);
        table.push(REPORT_COLUMNS.iter().map(|c| c.to_string()).collect());
        table.extend(self.rows.iter().map(ReportRow::cells));
        table
    }

    /// File name (without extension) for an export made on `date`.
    pub fn file_stem(&self, date: NaiveDate) -> String {
        format!("vehicle_history_{}_{}", self.device_id, date.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VehicleSnapshot;
    use chrono::{Duration, TimeZone};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn wib() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn window() -> TripWindow {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap();
        let mut lost = TrackPoint::new(0.0, 0.0, t0 + Duration::minutes(5), 0.0);
        lost.latitude = None;
        lost.valid = false;
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        TripWindow {
            device_id: "bus-7".to_string(),
            start_time: day.and_hms_opt(8, 0, 0).unwrap(),
            end_time: day.and_hms_opt(9, 0, 0).unwrap(),
            points: vec![
                TrackPoint::new(-6.2, 106.816666, t0, 12.34),
                lost,
                TrackPoint::new(-6.29, 106.816666, t0 + Duration::minutes(10), 40.0),
            ],
        }
    }

    #[test]
    fn test_live_formatting() {
        assert_eq!(format_coordinate(Some(-6.306393123)), "-6.306393");
        assert_eq!(format_coordinate(None), "N/A");
        assert_eq!(format_coordinate(Some(f64::NAN)), "N/A");
        assert_eq!(format_speed(42.26), "42.3 km/h");
        assert_eq!(format_speed(f64::NAN), "0 km/h");
        assert_eq!(format_distance_km(10.0), "10.00 km");
        assert_eq!(format_minutes(9.6), "10 minutes");
        assert_eq!(format_timestamp(None, utc()), "N/A");
        assert_eq!(
            maps_link(GpsPoint::new(-6.2, 106.8)),
            "https://www.google.com/maps?q=-6.2,106.8"
        );
    }

    #[test]
    fn test_fleet_rows() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap();
        let view = FleetView {
            vehicles: vec![
                VehicleSnapshot {
                    device_id: "bus-1".to_string(),
                    last_latitude: Some(-6.2),
                    last_longitude: Some(106.8),
                    last_speed: 0.0,
                    last_update: Some(now - Duration::seconds(30)),
                },
                VehicleSnapshot {
                    device_id: String::new(),
                    last_latitude: None,
                    last_longitude: None,
                    last_speed: 0.0,
                    last_update: None,
                },
            ],
            fetched_at: Some(now),
        };

        let rows = fleet_rows(&view, now, &ActivityConfig::default(), wib());
        assert_eq!(rows[0].status, ActivityStatus::Active);
        assert_eq!(rows[0].last_update, "2024-05-01 07:59:30");
        assert_eq!(rows[0].speed, "0.0 km/h");
        assert!(rows[0].maps_link.is_some());

        assert_eq!(rows[1].device_id, "Unknown");
        assert_eq!(rows[1].status, ActivityStatus::Stopped);
        assert_eq!(rows[1].latitude, "N/A");
        assert_eq!(rows[1].maps_link, None);
    }

    #[test]
    fn test_report_header_and_rows() {
        let report = TripReport::from_window(&window(), wib()).unwrap();
        let header = report.header();

        assert_eq!(header[0], ("Vehicle ID:", "bus-7".to_string()));
        assert_eq!(header[1], ("Period:", "2024-05-01 08:00:00 - 2024-05-01 09:00:00".to_string()));
        assert_eq!(header[2].0, "Total Distance:");
        assert!(header[2].1.ends_with(" km"));
        assert_eq!(header[3], ("Total Time:", "10 minutes".to_string()));
        assert_eq!(header[5], ("Total Points:", "3".to_string()));

        assert_eq!(report.rows[0].timestamp, "2024-05-01 08:00:00");
        assert_eq!(report.rows[0].latitude, "-6.200000");
        assert_eq!(report.rows[0].speed, "12.3 km/h");
        assert_eq!(report.rows[0].valid, "Yes");

        assert_eq!(report.rows[1].no, 2);
        assert_eq!(report.rows[1].latitude, "-");
        assert_eq!(report.rows[1].speed, "-");
        assert_eq!(report.rows[1].valid, "No");
    }

    #[test]
    fn test_report_table_layout() {
        let report = TripReport::from_window(&window(), utc()).unwrap();
        let table = report.table();

        assert_eq!(table[0], vec![REPORT_TITLE.to_string()]);
        assert_eq!(table[7], vec![String::new()]);
        assert_eq!(table[8][0], "No");
        assert_eq!(table.len(), 9 + 3);
        assert_eq!(table[11][0], "3");

        let day = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert_eq!(report.file_stem(day), "vehicle_history_bus-7_2024-06-02");
    }

    #[test]
    fn test_empty_window_has_no_report() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let empty = TripWindow::empty(
            "bus-7",
            day.and_hms_opt(8, 0, 0).unwrap(),
            day.and_hms_opt(9, 0, 0).unwrap(),
        );
        assert!(TripReport::from_window(&empty, utc()).is_none());
    }
}
