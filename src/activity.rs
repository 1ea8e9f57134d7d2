//! Live activity classification.
//!
//! A vehicle's status is derived from its last report and the time of
//! evaluation. It is never stored: the same snapshot can be `Active` now and
//! `Stopped` a minute later.
//!
//! Two rules have been used by the dashboard over time. The speed-aware rule
//! is the default; the age-band rule is kept reachable through
//! [`ActivityConfig::age_bands`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::minutes_between;
use crate::VehicleSnapshot;

/// Discrete activity state of one vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    /// Reported very recently
    Active,
    /// Not recent, but last seen moving
    Moving,
    /// Not recent and not moving, or never reported
    Stopped,
}

impl ActivityStatus {
    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ActivityStatus::Active => "Active",
            ActivityStatus::Moving => "Moving",
            ActivityStatus::Stopped => "Stopped",
        }
    }

    /// Style class the UI keys markers and table cells on.
    pub fn css_class(&self) -> &'static str {
        match self {
            ActivityStatus::Active => "active",
            ActivityStatus::Moving => "moving",
            ActivityStatus::Stopped => "stopped",
        }
    }
}

/// How report age and speed map to a status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ClassificationRule {
    /// `age <= active_within_minutes` is Active; otherwise Moving when the
    /// last speed is positive, else Stopped.
    SpeedAware { active_within_minutes: f64 },
    /// `age <= active_within_minutes` is Active; `age <= moving_within_minutes`
    /// is Moving whatever the speed; anything older is Stopped.
    AgeBands {
        active_within_minutes: f64,
        moving_within_minutes: f64,
    },
}

/// Configuration for activity classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Default: speed-aware with a 1 minute activity window
    pub rule: ClassificationRule,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            rule: ClassificationRule::SpeedAware {
                active_within_minutes: 1.0,
            },
        }
    }
}

impl ActivityConfig {
    /// The three-band rule: 2 minutes active, 5 minutes moving.
    pub fn age_bands() -> Self {
        Self {
            rule: ClassificationRule::AgeBands {
                active_within_minutes: 2.0,
                moving_within_minutes: 5.0,
            },
        }
    }

    /// Classify a last report under this configuration.
    ///
    /// A report timestamped after `now` (clock skew) has a negative age and
    /// counts as recent.
    pub fn classify(
        &self,
        last_update: Option<DateTime<Utc>>,
        speed: f64,
        now: DateTime<Utc>,
    ) -> ActivityStatus {
        let Some(last_update) = last_update else {
            return ActivityStatus::Stopped;
        };
        let age_minutes = minutes_between(last_update, now);

        match self.rule {
            ClassificationRule::SpeedAware { active_within_minutes } => {
                if age_minutes <= active_within_minutes {
                    ActivityStatus::Active
                } else if speed > 0.0 {
                    ActivityStatus::Moving
                } else {
                    ActivityStatus::Stopped
                }
            }
            ClassificationRule::AgeBands {
                active_within_minutes,
                moving_within_minutes,
            } => {
                if age_minutes <= active_within_minutes {
                    ActivityStatus::Active
                } else if age_minutes <= moving_within_minutes {
                    ActivityStatus::Moving
                } else {
                    ActivityStatus::Stopped
                }
            }
        }
    }

    /// Classify a vehicle snapshot under this configuration.
    pub fn classify_snapshot(
        &self,
        snapshot: &VehicleSnapshot,
        now: DateTime<Utc>,
    ) -> ActivityStatus {
        self.classify(snapshot.last_update, snapshot.last_speed, now)
    }
}

/// Classify a last report with the default rule.
///
/// # Example
/// ```
/// use chrono::{Duration, Utc};
/// use fleet_tracker::{classify, ActivityStatus};
///
/// let now = Utc::now();
/// assert_eq!(classify(Some(now - Duration::seconds(30)), 0.0, now), ActivityStatus::Active);
/// assert_eq!(classify(Some(now - Duration::minutes(10)), 40.0, now), ActivityStatus::Moving);
/// assert_eq!(classify(None, 40.0, now), ActivityStatus::Stopped);
/// ```
pub fn classify(
    last_update: Option<DateTime<Utc>>,
    speed: f64,
    now: DateTime<Utc>,
) -> ActivityStatus {
    ActivityConfig::default().classify(last_update, speed, now)
}

/// Classify a vehicle snapshot with the default rule.
pub fn classify_snapshot(snapshot: &VehicleSnapshot, now: DateTime<Utc>) -> ActivityStatus {
    ActivityConfig::default().classify_snapshot(snapshot, now)
}

/// Per-status tallies for a fleet header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: usize,
    pub moving: usize,
    pub stopped: usize,
}

impl StatusCounts {
    /// Classify every snapshot at `now` and count the results.
    pub fn tally(
        snapshots: &[VehicleSnapshot],
        now: DateTime<Utc>,
        config: &ActivityConfig,
    ) -> Self {
        snapshots
            .iter()
            .map(|s| config.classify_snapshot(s, now))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.active + self.moving + self.stopped
    }
}

impl FromIterator<ActivityStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = ActivityStatus>>(iter: I) -> Self {
        let mut counts = StatusCounts::default();
        for status in iter {
            match status {
                ActivityStatus::Active => counts.active += 1,
                ActivityStatus::Moving => counts.moving += 1,
                ActivityStatus::Stopped => counts.stopped += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn snapshot(age: Option<Duration>, speed: f64) -> VehicleSnapshot {
        VehicleSnapshot {
            device_id: "bus-1".to_string(),
            last_latitude: Some(-6.2),
            last_longitude: Some(106.8),
            last_speed: speed,
            last_update: age.map(|a| now() - a),
        }
    }

    #[test]
    fn test_recent_report_is_active() {
        assert_eq!(
            classify(Some(now() - Duration::seconds(30)), 0.0, now()),
            ActivityStatus::Active
        );
        assert_eq!(
            classify(Some(now() - Duration::seconds(60)), 0.0, now()),
            ActivityStatus::Active
        );
    }

    #[test]
    fn test_old_report_moving_or_stopped_by_speed() {
        assert_eq!(
            classify(Some(now() - Duration::minutes(10)), 40.0, now()),
            ActivityStatus::Moving
        );
        assert_eq!(
            classify(Some(now() - Duration::minutes(10)), 0.0, now()),
            ActivityStatus::Stopped
        );
        assert_eq!(
            classify(Some(now() - Duration::seconds(61)), 0.0, now()),
            ActivityStatus::Stopped
        );
    }

    #[test]
    fn test_missing_update_is_stopped() {
        assert_eq!(classify(None, 40.0, now()), ActivityStatus::Stopped);
    }

    #[test]
    fn test_nan_speed_is_not_moving() {
        assert_eq!(
            classify(Some(now() - Duration::minutes(10)), f64::NAN, now()),
            ActivityStatus::Stopped
        );
    }

    #[test]
    fn test_future_report_is_active() {
        assert_eq!(
            classify(Some(now() + Duration::minutes(3)), 0.0, now()),
            ActivityStatus::Active
        );
    }

    #[test]
    fn test_label_changes_as_time_passes() {
        let snap = snapshot(Some(Duration::seconds(30)), 0.0);
        assert_eq!(classify_snapshot(&snap, now()), ActivityStatus::Active);
        assert_eq!(classify_snapshot(&snap, now() + Duration::minutes(5)), ActivityStatus::Stopped);
    }

    #[test]
    fn test_age_bands_ignore_speed() {
        let config = ActivityConfig::age_bands();
        assert_eq!(
            config.classify(Some(now() - Duration::seconds(90)), 0.0, now()),
            ActivityStatus::Active
        );
        assert_eq!(
            config.classify(Some(now() - Duration::minutes(4)), 0.0, now()),
            ActivityStatus::Moving
        );
        assert_eq!(
            config.classify(Some(now() - Duration::minutes(6)), 80.0, now()),
            ActivityStatus::Stopped
        );
        assert_eq!(config.classify(None, 80.0, now()), ActivityStatus::Stopped);
    }

    #[test]
    fn test_custom_threshold() {
        let config = ActivityConfig {
            rule: ClassificationRule::SpeedAware { active_within_minutes: 15.0 },
        };
        assert_eq!(
            config.classify(Some(now() - Duration::minutes(10)), 0.0, now()),
            ActivityStatus::Active
        );
    }

    #[test]
    fn test_status_counts() {
        let fleet = vec![
            snapshot(Some(Duration::seconds(10)), 0.0),
            snapshot(Some(Duration::minutes(10)), 25.0),
            snapshot(Some(Duration::minutes(10)), 0.0),
            snapshot(None, 0.0),
        ];
        let counts = StatusCounts::tally(&fleet, now(), &ActivityConfig::default());
        assert_eq!(counts, StatusCounts { active: 1, moving: 1, stopped: 2 });
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_config_deserializes_from_json() {
        let json = r#"{"rule":{"rule":"age_bands","active_within_minutes":2.0,"moving_within_minutes":5.0}}"#;
        let config: ActivityConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, ActivityConfig::age_bands());
    }
}
