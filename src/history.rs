//! Historical trip queries.
//!
//! [`TripQuery`] validates what the history form submits, [`HistoryLoader`]
//! runs one query at a time for a requester that may change its mind, and
//! [`fetch_trip_summaries`] summarizes many windows with bounded concurrency.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::{stream, StreamExt};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{FleetError, QueryError};
use crate::source::TrackingSource;
use crate::trip::TripSummary;
use crate::TripWindow;

/// Maximum concurrent history requests in a batch.
pub const MAX_CONCURRENCY: usize = 8;

/// Progress callback: `(completed, total)`.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// One vehicle over one local time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripQuery {
    pub device_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TripQuery {
    /// Validate a query. A zero-length range is allowed.
    pub fn new(
        device_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Self, QueryError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(QueryError::MissingVehicle);
        }
        if end < start {
            return Err(QueryError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            device_id: device_id.to_string(),
            start,
            end,
        })
    }

    /// The whole local day, `00:00:00` through `23:59:59`.
    pub fn for_day(device_id: &str, date: NaiveDate) -> Result<Self, QueryError> {
        let end = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        Self::new(device_id, date.and_time(NaiveTime::MIN), date.and_time(end))
    }
}

/// Result of [`HistoryLoader::load`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded { window: TripWindow, summary: TripSummary },
    /// A newer load started (or the pending one was abandoned) before this
    /// one finished; its result was dropped
    Superseded,
}

/// Loads trip windows for a single requester.
///
/// Requests are not cancelled; each load takes a generation ticket and a
/// result whose ticket is no longer current is reported as
/// [`LoadOutcome::Superseded`], errors included.
pub struct HistoryLoader<S> {
    source: S,
    generation: AtomicU64,
}

impl<S: TrackingSource> HistoryLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            generation: AtomicU64::new(0),
        }
    }

    pub async fn load(&self, query: &TripQuery) -> Result<LoadOutcome, FleetError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let start = Instant::now();

        let result = self
            .source
            .fetch_history(&query.device_id, query.start, query.end)
            .await;

        if self.generation.load(Ordering::SeqCst) != ticket {
            debug!(
                "[HistoryLoader] Dropping superseded result for {} (ticket {})",
                query.device_id, ticket
            );
            return Ok(LoadOutcome::Superseded);
        }

        let window = result?;
        let summary = window.summary();
        if window.is_empty() {
            info!(
                "[HistoryLoader] No data for {} between {} and {}",
                query.device_id, query.start, query.end
            );
        } else {
            info!(
                "[HistoryLoader] {}: {} points, {:.2} km in {:?}",
                query.device_id,
                summary.point_count,
                summary.total_distance_km,
                start.elapsed()
            );
        }
        Ok(LoadOutcome::Loaded { window, summary })
    }

    /// Mark any pending load as superseded.
    pub fn abandon(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Summary (or failure) for one query of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub query: TripQuery,
    pub result: Result<TripSummary, FleetError>,
}

/// Fetch and summarize many trip windows, at most [`MAX_CONCURRENCY`] at a
/// time. Results come back in query order; one failure does not stop the rest.
pub async fn fetch_trip_summaries<S: TrackingSource>(
    source: &S,
    queries: Vec<TripQuery>,
    on_progress: Option<ProgressCallback>,
) -> Vec<BatchSummary> {
    let total = queries.len();
    let start = Instant::now();
    let completed = AtomicUsize::new(0);
    let completed = &completed;

    let mut results: Vec<(usize, BatchSummary)> = stream::iter(queries.into_iter().enumerate())
        .map(|(index, query)| {
            let callback = on_progress.clone();
            async move {
                let result = source
                    .fetch_history(&query.device_id, query.start, query.end)
                    .await
                    .map(|window| window.summary());

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("[Progress] {}/{} | {} ok={}", done, total, query.device_id, result.is_ok());
                if let Some(ref cb) = callback {
                    cb(done, total);
                }

                (index, BatchSummary { query, result })
            }
        })
        .buffer_unordered(MAX_CONCURRENCY)
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);

    let errors = results.iter().filter(|(_, r)| r.result.is_err()).count();
    info!(
        "[HistoryBatch] DONE: {}/{} success ({} errors) in {:.2}s",
        total - errors,
        total,
        errors,
        start.elapsed().as_secs_f64()
    );

    results.into_iter().map(|(_, r)| r).collect()
}
