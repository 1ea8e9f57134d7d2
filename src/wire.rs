//! Decoding of tracking API payloads.
//!
//! Every endpoint answers with an envelope:
//!
//! ```json
//! { "status": "success", "message": "...", "data": ... }
//! ```
//!
//! Upstream records are loosely typed: numbers arrive as JSON numbers or as
//! numeric strings, ids may be numbers, and any field can be null or
//! missing. Decoding is field-lenient: a field that cannot be read becomes
//! absent and the rest of the record survives. A record that is not an
//! object at all is dropped with a warning. Only an unreadable body or a
//! non-success envelope fails the whole request.

use chrono::{FixedOffset, NaiveDateTime};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::FleetError;
use crate::time::parse_timestamp;
use crate::{Stop, TrackPoint, TripWindow, VehicleSnapshot};

const SUCCESS: &str = "success";

// ============================================================================
// Lenient field decoders
// ============================================================================

fn number_from_value(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_from_value(&Value::deserialize(deserializer)?))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    })
}

// ============================================================================
// Wire records
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default, deserialize_with = "lenient_string")]
    status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

/// One vehicle from `/api/tracking/fleet`.
#[derive(Debug, Clone, Deserialize)]
pub struct WireVehicle {
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub last_latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub last_longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub last_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_update: Option<String>,
}

impl WireVehicle {
    pub fn into_snapshot(self, local_offset: FixedOffset) -> VehicleSnapshot {
        VehicleSnapshot {
            device_id: self.device_id.unwrap_or_default(),
            last_latitude: self.last_latitude,
            last_longitude: self.last_longitude,
            last_speed: self.last_speed.unwrap_or(0.0),
            last_update: self
                .last_update
                .as_deref()
                .and_then(|raw| parse_timestamp(raw, local_offset)),
        }
    }
}

/// One fix from `/api/tracking/history/{device_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WireTrackPoint {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub valid: bool,
}

impl WireTrackPoint {
    pub fn into_track_point(self, local_offset: FixedOffset) -> TrackPoint {
        TrackPoint {
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp: self
                .timestamp
                .as_deref()
                .and_then(|raw| parse_timestamp(raw, local_offset)),
            speed: self.speed.unwrap_or(0.0),
            valid: self.valid,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireHistory {
    #[serde(default, deserialize_with = "lenient_string")]
    device_id: Option<String>,
    #[serde(default)]
    track_points: Value,
}

/// One stop from `/api/routes`.
#[derive(Debug, Clone, Deserialize)]
pub struct WireStop {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub rute_trip_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rute_sort: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub halte_name: Option<String>,
}

impl From<WireStop> for Stop {
    fn from(w: WireStop) -> Self {
        Stop {
            id: w.id.unwrap_or_default(),
            route_trip_id: w.rute_trip_id,
            sort_key: w.rute_sort,
            latitude: w.latitude,
            longitude: w.longitude,
            name: w.halte_name.unwrap_or_default(),
        }
    }
}

// ============================================================================
// Envelope decoding
// ============================================================================

/// Parse the envelope; `Ok(Err(message))` is a readable non-success answer.
fn open_envelope(body: &[u8]) -> Result<Result<Value, (String, String)>, FleetError> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    match envelope.status.as_deref() {
        None | Some(SUCCESS) => Ok(Ok(envelope.data)),
        Some(other) => Ok(Err((
            other.to_string(),
            envelope.message.unwrap_or_default(),
        ))),
    }
}

fn decode_records<T: DeserializeOwned>(data: Value, kind: &str) -> Result<Vec<T>, FleetError> {
    let items = match data {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(FleetError::Decode(format!(
                "expected a list of {} records, got {}",
                kind,
                type_name(&other)
            )))
        }
    };

    let total = items.len();
    let records: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("[Wire] Dropping {} record #{}: {}", kind, i, e);
                None
            }
        })
        .collect();

    if records.len() < total {
        warn!("[Wire] Kept {}/{} {} records", records.len(), total, kind);
    }
    Ok(records)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Decode a fleet response body into vehicle snapshots.
pub fn decode_fleet(
    body: &[u8],
    local_offset: FixedOffset,
) -> Result<Vec<VehicleSnapshot>, FleetError> {
    let data = open_envelope(body)?
        .map_err(|(status, message)| FleetError::Api { status, message })?;
    let vehicles: Vec<WireVehicle> = decode_records(data, "vehicle")?;
    Ok(vehicles
        .into_iter()
        .map(|v| v.into_snapshot(local_offset))
        .collect())
}

/// Decode a history response body into a trip window.
///
/// A non-success envelope here means "no data for the period" and yields an
/// empty window rather than an error.
pub fn decode_history(
    body: &[u8],
    device_id: &str,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    local_offset: FixedOffset,
) -> Result<TripWindow, FleetError> {
    let data = match open_envelope(body)? {
        Ok(data) => data,
        Err((status, message)) => {
            info!(
                "[Wire] No history for {} (status '{}'): {}",
                device_id, status, message
            );
            return Ok(TripWindow::empty(device_id, start_time, end_time));
        }
    };

    if data.is_null() {
        return Ok(TripWindow::empty(device_id, start_time, end_time));
    }

    let history: WireHistory = serde_json::from_value(data)?;
    let points: Vec<WireTrackPoint> = decode_records(history.track_points, "track point")?;

    Ok(TripWindow {
        device_id: history
            .device_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| device_id.to_string()),
        start_time,
        end_time,
        points: points
            .into_iter()
            .map(|p| p.into_track_point(local_offset))
            .collect(),
    })
}

/// Decode a routes response body into stops.
pub fn decode_routes(body: &[u8]) -> Result<Vec<Stop>, FleetError> {
    let data = open_envelope(body)?
        .map_err(|(status, message)| FleetError::Api { status, message })?;
    let stops: Vec<WireStop> = decode_records(data, "stop")?;
    Ok(stops.into_iter().map(Stop::from).collect())
}
