//! HTTP client for the fleet tracking API.
//!
//! This module provides the reqwest implementation of [`TrackingSource`]:
//! - Connection pooling with keep-alive
//! - A per-request timeout
//! - Automatic retry with exponential backoff on transport errors and 429
//! - History bounds sent in the API's literal `YYYY-MM-DDTHH:MM:SS` format

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDateTime};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::error::FleetError;
use crate::source::TrackingSource;
use crate::time::{format_query_timestamp, offset_from_hours};
use crate::wire;
use crate::{Stop, TripWindow, VehicleSnapshot};

/// Configuration for [`TrackingClient`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root, e.g. `http://localhost:3013`
    pub base_url: String,
    /// Per-request timeout. Default: 10 seconds
    pub timeout_secs: u64,
    /// Retries after the first attempt on transport errors and 429. Default: 3
    pub max_retries: u32,
    /// Offset of the API's local timestamps, in hours east of UTC. Default: 0
    pub utc_offset_hours: i32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3013".to_string(),
            timeout_secs: 10,
            max_retries: 3,
            utc_offset_hours: 0,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `FLEET_API_URL`, `FLEET_API_TIMEOUT_SECS` and
    /// `FLEET_UTC_OFFSET_HOURS` when set.
    pub fn from_env() -> Result<Self, FleetError> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("FLEET_API_URL") {
            config.base_url = url;
        }
        if let Ok(raw) = std::env::var("FLEET_API_TIMEOUT_SECS") {
            config.timeout_secs = raw
                .trim()
                .parse()
                .map_err(|e| FleetError::Config(format!("FLEET_API_TIMEOUT_SECS={}: {}", raw, e)))?;
        }
        if let Ok(raw) = std::env::var("FLEET_UTC_OFFSET_HOURS") {
            config.utc_offset_hours = raw
                .trim()
                .parse()
                .map_err(|e| FleetError::Config(format!("FLEET_UTC_OFFSET_HOURS={}: {}", raw, e)))?;
        }
        Ok(config)
    }

    pub fn local_offset(&self) -> Result<FixedOffset, FleetError> {
        offset_from_hours(self.utc_offset_hours).ok_or_else(|| {
            FleetError::Config(format!("UTC offset out of range: {}h", self.utc_offset_hours))
        })
    }
}

/// Query parameters for a history request.
fn history_query(start: &NaiveDateTime, end: &NaiveDateTime) -> [(&'static str, String); 2] {
    [
        ("start_date", format_query_timestamp(start)),
        ("end_date", format_query_timestamp(end)),
    ]
}

/// Client for the tracking API.
pub struct TrackingClient {
    client: Client,
    base_url: Url,
    max_retries: u32,
    local_offset: FixedOffset,
}

impl TrackingClient {
    /// Create a client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, FleetError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            FleetError::Config(format!("Invalid base URL '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(FleetError::Config(format!("Invalid base URL '{}'", config.base_url)));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FleetError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            max_retries: config.max_retries,
            local_offset: config.local_offset()?,
        })
    }

    /// Base URL with path segments appended (each segment is percent-encoded).
    fn endpoint(&self, segments: &[&str]) -> Result<Url, FleetError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FleetError::Config(format!("Invalid base URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_body(&self, url: Url, query: &[(&str, String)]) -> Result<Vec<u8>, FleetError> {
        let mut retries = 0;
        let req_start = Instant::now();

        loop {
            // Phase 1: Send request, receive headers
            let response = self.client.get(url.clone()).query(query).send().await;
            let headers_elapsed = req_start.elapsed();

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > self.max_retries {
                            return Err(FleetError::RetriesExhausted("429".to_string()));
                        }
                        // Exponential backoff: 500ms, 1s, 2s, 4s max
                        let wait = Duration::from_millis(500 * (1 << retries.min(3)));
                        warn!(
                            "[Fetch {}] 429 Too Many Requests after {:?}, retry {} with {:?} backoff",
                            url.path(), headers_elapsed, retries, wait
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if !status.is_success() {
                        return Err(FleetError::Status { status: status.as_u16() });
                    }

                    // Phase 2: Download response body
                    let body_start = Instant::now();
                    let bytes = resp.bytes().await.map_err(|e| {
                        if e.is_timeout() {
                            FleetError::Timeout
                        } else {
                            FleetError::Transport(format!("Body download error: {}", e))
                        }
                    })?;

                    debug!(
                        "[Fetch {}] headers={:?} body={:?}({:.1}KB) total={:?}",
                        url.path(),
                        headers_elapsed,
                        body_start.elapsed(),
                        bytes.len() as f64 / 1024.0,
                        req_start.elapsed()
                    );

                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.max_retries {
                        return Err(if e.is_timeout() {
                            FleetError::Timeout
                        } else {
                            FleetError::Transport(e.to_string())
                        });
                    }

                    let wait = Duration::from_millis(200 * (1 << retries.min(4)));
                    warn!(
                        "[Fetch {}] Error: {}, retry {} after {:?}",
                        url.path(), e, retries, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[async_trait]
impl TrackingSource for TrackingClient {
    async fn fetch_fleet(&self) -> Result<Vec<VehicleSnapshot>, FleetError> {
        let url = self.endpoint(&["api", "tracking", "fleet"])?;
        let body = self.get_body(url, &[]).await?;
        let fleet = wire::decode_fleet(&body, self.local_offset)?;
        debug!("[TrackingClient] Fleet: {} vehicles", fleet.len());
        Ok(fleet)
    }

    async fn fetch_history(
        &self,
        device_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<TripWindow, FleetError> {
        let url = self.endpoint(&["api", "tracking", "history", device_id])?;
        let query = history_query(&start, &end);
        let body = self.get_body(url, &query).await?;
        let window = wire::decode_history(&body, device_id, start, end, self.local_offset)?;
        info!(
            "[TrackingClient] History {} {}..{}: {} points",
            device_id, query[0].1, query[1].1, window.points.len()
        );
        Ok(window)
    }

    async fn fetch_routes(&self) -> Result<Vec<Stop>, FleetError> {
        let url = self.endpoint(&["api", "routes"])?;
        let body = self.get_body(url, &[]).await?;
        let stops = wire::decode_routes(&body)?;
        info!("[TrackingClient] Routes: {} stops", stops.len());
        Ok(stops)
    }
}
