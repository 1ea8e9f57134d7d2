//! Recurring fleet refresh for the live view.
//!
//! A [`PollingSession`] fetches the fleet on a fixed interval, classifies each
//! vehicle at the time of the tick, and hands a [`TickReport`] to the
//! observer given to [`PollingSession::start`].
//!
//! Guarantees:
//! - ticks stay on the interval grid; a tick that fires while a fetch is
//!   pending is skipped, never queued or retried when the fetch returns
//! - at most one fleet fetch per schedule is in flight; restarting the
//!   schedule does not wait for a fetch the restart already discarded
//! - after [`PollingSession::stop`] returns, no observer call happens and no
//!   in-flight result is applied
//! - a failed fetch leaves the previous [`FleetView`] in place
//!
//! The session is `Idle` between fetches and `Fetching` while one runs; the
//! success/failure of each fetch is reported through [`TickReport::error`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::activity::{ActivityConfig, ActivityStatus, StatusCounts};
use crate::error::FleetError;
use crate::geo_utils::{compute_bounds, map_center};
use crate::source::TrackingSource;
use crate::{Bounds, GpsPoint, VehicleSnapshot};

/// Source of the current time for classification.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Configuration for a polling session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Refresh interval in milliseconds. Default: 5000
    pub interval_ms: u64,
    /// Rule used to classify vehicles on each tick
    pub activity: ActivityConfig,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            activity: ActivityConfig::default(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Whether a refresh should surface a loading indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMode {
    /// User asked for it; show progress
    Visible,
    /// Background tick; refresh quietly
    Silent,
}

/// Whether a fleet fetch is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Fetching,
}

/// The last successfully fetched snapshot set.
///
/// Replaced as a whole on every successful fetch, never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetView {
    pub vehicles: Vec<VehicleSnapshot>,
    /// When the snapshot set was fetched; `None` before the first success
    pub fetched_at: Option<DateTime<Utc>>,
}

impl FleetView {
    /// Status of every vehicle, in `vehicles` order, as of `now`.
    pub fn statuses(&self, now: DateTime<Utc>, config: &ActivityConfig) -> Vec<ActivityStatus> {
        self.vehicles
            .iter()
            .map(|v| config.classify_snapshot(v, now))
            .collect()
    }

    pub fn counts(&self, now: DateTime<Utc>, config: &ActivityConfig) -> StatusCounts {
        StatusCounts::tally(&self.vehicles, now, config)
    }

    /// Vehicles that can be placed on a map, with their positions.
    pub fn located(&self) -> impl Iterator<Item = (&VehicleSnapshot, GpsPoint)> + '_ {
        self.vehicles
            .iter()
            .filter_map(|v| v.position().map(|p| (v, p)))
    }

    /// First locatable vehicle, or the default map center.
    pub fn center(&self) -> GpsPoint {
        map_center(self.vehicles.iter().map(VehicleSnapshot::position))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let positions: Vec<GpsPoint> = self.located().map(|(_, p)| p).collect();
        compute_bounds(&positions)
    }
}

/// Result of one completed refresh.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub mode: RefreshMode,
    /// Time the statuses were evaluated at
    pub evaluated_at: DateTime<Utc>,
    /// The view after this refresh: new on success, the previous one on failure
    pub view: Arc<FleetView>,
    /// Status per vehicle of `view`, evaluated at `evaluated_at`
    pub statuses: Vec<ActivityStatus>,
    /// Set when the fetch failed
    pub error: Option<FleetError>,
}

impl TickReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// What happened to a refresh request.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Completed(TickReport),
    /// Another fetch was already in flight
    Skipped,
    /// The session was stopped while the fetch ran; the result was dropped
    Discarded,
}

type TickCallback = Box<dyn Fn(&TickReport) + Send + Sync>;

struct Shared<S> {
    source: S,
    clock: Arc<dyn Clock>,
    activity: ActivityConfig,
    /// `generation + 1` of the fetch in flight, 0 when idle
    in_flight: AtomicU64,
    generation: AtomicU64,
    view_tx: watch::Sender<Arc<FleetView>>,
    observer: Mutex<Option<TickCallback>>,
}

impl<S> Shared<S> {
    /// Claim the in-flight slot for `generation`. A fetch left over from an
    /// earlier generation does not hold the slot.
    fn try_begin(&self, generation: u64) -> bool {
        let marker = generation + 1;
        let mut current = self.in_flight.load(Ordering::SeqCst);
        loop {
            if current >= marker {
                return false;
            }
            match self
                .in_flight
                .compare_exchange(current, marker, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn finish(&self, generation: u64) {
        // Only release the slot if a newer generation has not taken it over
        let _ = self.in_flight.compare_exchange(
            generation + 1,
            0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn is_fetching(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == self.generation.load(Ordering::SeqCst) + 1
    }
}

impl<S: TrackingSource> Shared<S> {
    async fn refresh(&self, mode: RefreshMode) -> RefreshOutcome {
        let generation = self.generation.load(Ordering::SeqCst);

        if !self.try_begin(generation) {
            debug!(
                "[PollingSession] {:?} refresh skipped: fetch already in flight",
                mode
            );
            return RefreshOutcome::Skipped;
        }

        let result = self.source.fetch_fleet().await;
        self.finish(generation);

        // Deliver under the observer lock so stop() can wait out a delivery.
        let observer = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("[PollingSession] Discarding {:?} refresh result after stop", mode);
            return RefreshOutcome::Discarded;
        }

        let now = self.clock.now();
        let error = match result {
            Ok(vehicles) => {
                debug!("[PollingSession] {:?} refresh: {} vehicles", mode, vehicles.len());
                self.view_tx.send_replace(Arc::new(FleetView {
                    vehicles,
                    fetched_at: Some(now),
                }));
                None
            }
            Err(e) => {
                warn!("[PollingSession] {:?} refresh failed, keeping previous fleet: {}", mode, e);
                Some(e)
            }
        };

        let view = self.view_tx.borrow().clone();
        let report = TickReport {
            mode,
            evaluated_at: now,
            statuses: view.statuses(now, &self.activity),
            view,
            error,
        };

        if let Some(callback) = observer.as_ref() {
            callback(&report);
        }
        RefreshOutcome::Completed(report)
    }
}

/// Recurring fetch → classify controller for the live fleet view.
///
/// # Example
/// ```no_run
/// use fleet_tracker::{ClientConfig, PollingConfig, PollingSession, TrackingClient};
///
/// # async fn run() -> Result<(), fleet_tracker::FleetError> {
/// let client = TrackingClient::new(&ClientConfig::from_env()?)?;
/// let config = PollingConfig::default();
/// let mut session = PollingSession::new(client, config);
///
/// session.start(config.interval(), |report| {
///     println!("{} vehicles, error: {:?}", report.view.vehicles.len(), report.error);
/// })?;
/// // ... later, when the view goes away
/// session.stop();
/// # Ok(())
/// # }
/// ```
pub struct PollingSession<S> {
    shared: Arc<Shared<S>>,
    task: Option<(CancellationToken, JoinHandle<()>)>,
}

impl<S: TrackingSource + 'static> PollingSession<S> {
    /// Create a stopped session reading time from the system clock.
    pub fn new(source: S, config: PollingConfig) -> Self {
        Self::with_clock(source, config, Arc::new(SystemClock))
    }

    /// Create a stopped session with an explicit clock.
    pub fn with_clock(source: S, config: PollingConfig, clock: Arc<dyn Clock>) -> Self {
        let (view_tx, _) = watch::channel(Arc::new(FleetView::default()));
        Self {
            shared: Arc::new(Shared {
                source,
                clock,
                activity: config.activity,
                in_flight: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                view_tx,
                observer: Mutex::new(None),
            }),
            task: None,
        }
    }

    /// Begin polling: `on_tick` receives a report right away and then once per
    /// `interval`. Restarts the schedule if the session is already running.
    ///
    /// Must be called from within a tokio runtime. `on_tick` runs while the
    /// session holds its delivery lock and must not call [`Self::stop`].
    pub fn start<F>(&mut self, interval: Duration, on_tick: F) -> Result<(), FleetError>
    where
        F: Fn(&TickReport) + Send + Sync + 'static,
    {
        if interval.is_zero() {
            return Err(FleetError::Config("polling interval must be positive".to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| FleetError::Config(format!("no tokio runtime: {}", e)))?;

        self.stop();
        *self
            .shared
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(on_tick));

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let shared = Arc::clone(&self.shared);

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // Off the loop so the next tick keeps its slot on the grid
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    shared.refresh(RefreshMode::Silent).await;
                });
            }

            debug!("[PollingSession] Polling loop exited");
        });

        info!("[PollingSession] Started polling every {:?}", interval);
        self.task = Some((token, handle));
        Ok(())
    }

    /// Cancel the schedule. A fetch already running completes, but its result
    /// is dropped and no observer call happens once this returns.
    pub fn stop(&mut self) {
        let Some((token, _handle)) = self.task.take() else {
            return;
        };
        token.cancel();

        let mut observer = self.shared.observer.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        *observer = None;
        info!("[PollingSession] Stopped polling");
    }

    /// Fetch and classify now. Visible refreshes are for user-initiated
    /// reloads; the fetch itself is the same as a background tick.
    pub async fn refresh(&self, mode: RefreshMode) -> RefreshOutcome {
        self.shared.refresh(mode).await
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|(token, _)| !token.is_cancelled())
    }

    pub fn state(&self) -> SessionState {
        if self.shared.is_fetching() {
            SessionState::Fetching
        } else {
            SessionState::Idle
        }
    }

    /// The last successfully fetched view.
    pub fn latest(&self) -> Arc<FleetView> {
        self.shared.view_tx.borrow().clone()
    }

    /// Receiver that observes every new view.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FleetView>> {
        self.shared.view_tx.subscribe()
    }
}

impl<S> Drop for PollingSession<S> {
    fn drop(&mut self) {
        if let Some((token, _)) = self.task.take() {
            token.cancel();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Stop, TripWindow};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, NaiveDateTime, TimeZone};
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn vehicle(id: &str, age_secs: i64, speed: f64) -> VehicleSnapshot {
        VehicleSnapshot {
            device_id: id.to_string(),
            last_latitude: Some(-6.2),
            last_longitude: Some(106.8),
            last_speed: speed,
            last_update: Some(now() - ChronoDuration::seconds(age_secs)),
        }
    }

    struct FakeSource {
        fleet: Vec<VehicleSnapshot>,
        delay: Duration,
        fail: AtomicBool,
        calls: AtomicUsize,
        current: AtomicUsize,
        max_concurrent: AtomicUsize,
        started: Mutex<Vec<tokio::time::Instant>>,
    }

    impl FakeSource {
        fn new(delay: Duration) -> Self {
            Self {
                fleet: vec![vehicle("bus-1", 20, 0.0), vehicle("bus-2", 600, 35.0)],
                delay,
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                current: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
                started: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TrackingSource for FakeSource {
        async fn fetch_fleet(&self) -> Result<Vec<VehicleSnapshot>, FleetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.lock().unwrap().push(tokio::time::Instant::now());
            let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(running, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.current.fetch_sub(1, Ordering::SeqCst);

            if self.fail.load(Ordering::SeqCst) {
                Err(FleetError::Transport("connection refused".to_string()))
            } else {
                Ok(self.fleet.clone())
            }
        }

        async fn fetch_history(
            &self,
            device_id: &str,
            start: NaiveDateTime,
            end: NaiveDateTime,
        ) -> Result<TripWindow, FleetError> {
            Ok(TripWindow::empty(device_id, start, end))
        }

        async fn fetch_routes(&self) -> Result<Vec<Stop>, FleetError> {
            Ok(Vec::new())
        }
    }

    fn session(source: &Arc<FakeSource>) -> PollingSession<Arc<FakeSource>> {
        PollingSession::with_clock(
            Arc::clone(source),
            PollingConfig::default(),
            Arc::new(FixedClock(now())),
        )
    }

    fn tick_counter() -> (Arc<AtomicUsize>, impl Fn(&TickReport) + Send + Sync + 'static) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        (ticks, move |_: &TickReport| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_immediately_then_every_interval() {
        let source = Arc::new(FakeSource::new(Duration::ZERO));
        let mut session = session(&source);
        let (ticks, on_tick) = tick_counter();

        session.start(Duration::from_millis(5000), on_tick).unwrap();
        assert!(session.is_running());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);

        session.stop();
        assert!(!session.is_running());
        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_skips_ticks_on_the_grid() {
        let source = Arc::new(FakeSource::new(Duration::from_secs(12)));
        let mut session = session(&source);
        let (_ticks, on_tick) = tick_counter();
        let origin = tokio::time::Instant::now();

        session.start(Duration::from_secs(5), on_tick).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(session.state(), SessionState::Fetching);

        // A user refresh while the tick's fetch is pending is skipped
        assert!(matches!(session.refresh(RefreshMode::Visible).await, RefreshOutcome::Skipped));

        tokio::time::sleep(Duration::from_secs(60)).await;
        session.stop();

        assert_eq!(source.max_concurrent.load(Ordering::SeqCst), 1);
        // Ticks at 5s, 10s, 20s, 25s, ... land on a pending fetch and are dropped
        let started: Vec<u128> = source
            .started
            .lock()
            .unwrap()
            .iter()
            .map(|t| (*t - origin).as_millis())
            .collect();
        assert_eq!(started, vec![0, 15_000, 30_000, 45_000, 60_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_ticks_immediately_despite_pending_fetch() {
        let source = Arc::new(FakeSource::new(Duration::from_secs(12)));
        let mut session = session(&source);
        let (old_ticks, on_old) = tick_counter();
        let (new_ticks, on_new) = tick_counter();

        session.start(Duration::from_secs(30), on_old).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        session.start(Duration::from_secs(30), on_new).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        // The restarted schedule fetches right away instead of waiting 30s
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(session.state(), SessionState::Fetching);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(old_ticks.load(Ordering::SeqCst), 0);
        assert_eq!(new_ticks.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.latest().vehicles.len(), 2);
        session.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_result() {
        let source = Arc::new(FakeSource::new(Duration::from_secs(3)));
        let mut session = session(&source);
        let (ticks, on_tick) = tick_counter();

        session.start(Duration::from_secs(5), on_tick).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        session.stop();
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert!(session.latest().vehicles.is_empty());
        assert!(session.latest().fetched_at.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_view() {
        let source = Arc::new(FakeSource::new(Duration::ZERO));
        let session = session(&source);

        let RefreshOutcome::Completed(first) = session.refresh(RefreshMode::Visible).await else {
            panic!("first refresh did not complete");
        };
        assert!(first.is_success());
        assert_eq!(first.view.vehicles.len(), 2);

        source.fail.store(true, Ordering::SeqCst);
        let RefreshOutcome::Completed(second) = session.refresh(RefreshMode::Visible).await else {
            panic!("second refresh did not complete");
        };
        assert_eq!(
            second.error,
            Some(FleetError::Transport("connection refused".to_string()))
        );
        assert!(Arc::ptr_eq(&second.view, &first.view));
        assert_eq!(session.latest().vehicles.len(), 2);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_report_classifies_at_tick_time() {
        let source = Arc::new(FakeSource::new(Duration::ZERO));
        let session = session(&source);

        let RefreshOutcome::Completed(report) = session.refresh(RefreshMode::Visible).await else {
            panic!("refresh did not complete");
        };
        assert_eq!(report.evaluated_at, now());
        assert_eq!(report.statuses, vec![ActivityStatus::Active, ActivityStatus::Moving]);
        assert_eq!(report.view.fetched_at, Some(now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_are_silent_and_manual_refresh_visible() {
        let source = Arc::new(FakeSource::new(Duration::ZERO));
        let mut session = session(&source);
        let modes = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&modes);

        session
            .start(Duration::from_secs(5), move |report| {
                seen.lock().unwrap().push(report.mode);
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let RefreshOutcome::Completed(manual) = session.refresh(RefreshMode::Visible).await else {
            panic!("manual refresh did not complete");
        };
        assert_eq!(manual.mode, RefreshMode::Visible);
        session.stop();

        assert_eq!(*modes.lock().unwrap(), vec![RefreshMode::Silent, RefreshMode::Visible]);
    }

    #[tokio::test]
    async fn test_subscribers_see_new_views() {
        let source = Arc::new(FakeSource::new(Duration::ZERO));
        let session = session(&source);
        let mut rx = session.subscribe();

        session.refresh(RefreshMode::Silent).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().vehicles.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let source = Arc::new(FakeSource::new(Duration::ZERO));
        let mut session = session(&source);
        let (_ticks, on_tick) = tick_counter();
        assert!(matches!(
            session.start(Duration::ZERO, on_tick),
            Err(FleetError::Config(_))
        ));
        assert!(!session.is_running());
    }

    #[test]
    fn test_fleet_view_helpers() {
        let mut unplaced = vehicle("ghost", 10, 0.0);
        unplaced.last_latitude = None;
        let view = FleetView {
            vehicles: vec![unplaced, vehicle("bus-1", 10, 0.0), vehicle("bus-2", 600, 0.0)],
            fetched_at: Some(now()),
        };

        assert_eq!(view.located().count(), 2);
        assert_eq!(view.center(), GpsPoint::new(-6.2, 106.8));
        assert!(view.bounds().is_some());
        let counts = view.counts(now(), &ActivityConfig::default());
        assert_eq!(counts, StatusCounts { active: 2, moving: 0, stopped: 1 });

        assert_eq!(FleetView::default().center(), crate::geo_utils::DEFAULT_CENTER);
    }
}
