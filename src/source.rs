//! The data-access seam between the core and whatever talks to the tracking API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::FleetError;
use crate::{Stop, TripWindow, VehicleSnapshot};

/// Supplier of raw fleet, history and route records.
///
/// [`crate::http::TrackingClient`] implements this over HTTP; tests and
/// embedders can provide their own.
#[async_trait]
pub trait TrackingSource: Send + Sync {
    /// Latest snapshot of every vehicle.
    async fn fetch_fleet(&self) -> Result<Vec<VehicleSnapshot>, FleetError>;

    /// Track points of one vehicle between two local times. A period without
    /// data is an empty window, not an error.
    async fn fetch_history(
        &self,
        device_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<TripWindow, FleetError>;

    /// Every stop of every route, unordered.
    async fn fetch_routes(&self) -> Result<Vec<Stop>, FleetError>;
}

#[async_trait]
impl<S: TrackingSource + ?Sized> TrackingSource for Arc<S> {
    async fn fetch_fleet(&self) -> Result<Vec<VehicleSnapshot>, FleetError> {
        (**self).fetch_fleet().await
    }

    async fn fetch_history(
        &self,
        device_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<TripWindow, FleetError> {
        (**self).fetch_history(device_id, start, end).await
    }

    async fn fetch_routes(&self) -> Result<Vec<Stop>, FleetError> {
        (**self).fetch_routes().await
    }
}
