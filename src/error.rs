//! Error types.
//!
//! Only whole-request failures are errors. A malformed field inside a record
//! is dropped during decoding, and an empty result is an empty value.

use thiserror::Error;

/// Failures talking to the tracking API.
///
/// Callers keep whatever data they already hold when one of these surfaces.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FleetError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("API returned status '{status}': {message}")]
    Api { status: String, message: String },

    #[error("Response decode error: {0}")]
    Decode(String),

    #[error("Max retries exceeded ({0})")]
    RetriesExhausted(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for FleetError {
    fn from(e: serde_json::Error) -> Self {
        FleetError::Decode(e.to_string())
    }
}

/// Raised by the explicit ordering check on track points.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TripError {
    #[error("Track point {index} is earlier than the point before it")]
    OutOfOrder { index: usize },
}

/// Raised when a history query cannot be issued.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Please select a vehicle")]
    MissingVehicle,

    #[error("End date {end} is before start date {start}")]
    InvertedRange { start: String, end: String },
}
