//! Operator metrics.
//!
//! Metrics are recorded through the `metrics` crate facade; the operator
//! binary installs a Prometheus recorder and serves them on `/metrics`.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `prescaledcronjoboperator_cronjob_action_total` | Counter | `action`, `outcome` | Writes against derived schedules |
//! | `prescalecronjoboperator_cronjob_time_to_schedule` | Histogram | `prescalecron`, `nodepool`, `durationtype` | Creation to scheduled |
//! | `prescalecronjoboperator_cronjob_time_init_container_ran` | Histogram | `prescalecron`, `nodepool`, `durationtype` | Warm-up duration |
//! | `prescalecronjoboperator_cronjob_time_to_start_workload` | Histogram | `prescalecron`, `nodepool`, `durationtype` | Warm-up finished to workload started |
//! | `prescalecronjoboperator_cronjob_time_delay_of_workload` | Histogram | `prescalecron`, `nodepool`, `durationtype` | Expected fire time to workload started |

use metrics::{counter, histogram};

use crate::lifecycle::{Observation, Transition};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: create/update/delete actions against derived schedules.
    pub const CRONJOB_ACTION_TOTAL: &str = "prescaledcronjoboperator_cronjob_action_total";
    /// Histogram: creation to scheduled, in seconds.
    pub const TIME_TO_SCHEDULE: &str = "prescalecronjoboperator_cronjob_time_to_schedule";
    /// Histogram: warm-up step run time, in seconds.
    pub const TIME_INIT_CONTAINER_RAN: &str =
        "prescalecronjoboperator_cronjob_time_init_container_ran";
    /// Histogram: warm-up finished to workload started, in seconds.
    pub const TIME_TO_START_WORKLOAD: &str =
        "prescalecronjoboperator_cronjob_time_to_start_workload";
    /// Histogram: expected fire time to workload started, in seconds.
    pub const TIME_DELAY_OF_WORKLOAD: &str =
        "prescalecronjoboperator_cronjob_time_delay_of_workload";

    /// All duration histograms.
    pub const HISTOGRAMS: [&str; 4] = [
        TIME_TO_SCHEDULE,
        TIME_INIT_CONTAINER_RAN,
        TIME_TO_START_WORKLOAD,
        TIME_DELAY_OF_WORKLOAD,
    ];
}

/// Label keys used across metrics.
pub mod labels {
    /// Action kind (create, update, delete).
    pub const ACTION: &str = "action";
    /// Outcome (success, failure).
    pub const OUTCOME: &str = "outcome";
    /// Name of the source specification.
    pub const PRESCALE_CRON: &str = "prescalecron";
    /// Node pool the instance ran on.
    pub const NODE_POOL: &str = "nodepool";
    /// Sign of the duration (early, late).
    pub const DURATION_TYPE: &str = "durationtype";
}

/// First histogram bucket upper bound, in seconds.
pub const BUCKET_START: f64 = 2.0;
/// Growth factor between histogram buckets.
pub const BUCKET_FACTOR: f64 = 1.32;
/// Number of histogram buckets.
pub const BUCKET_COUNT: usize = 28;

/// Exponential bucket bounds shared by all duration histograms.
///
/// Covers roughly 2 seconds up to about an hour.
#[must_use]
pub fn duration_buckets() -> Vec<f64> {
    std::iter::successors(Some(BUCKET_START), |b| Some(b * BUCKET_FACTOR))
        .take(BUCKET_COUNT)
        .collect()
}

/// Kind of write performed against a derived schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronAction {
    /// A derived schedule was created.
    Create,
    /// A derived schedule was replaced.
    Update,
    /// Deletion bookkeeping, including finalizer registration.
    Delete,
}

impl CronAction {
    /// Label value for this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

const fn histogram_for(transition: Transition) -> &'static str {
    match transition {
        Transition::TimeToSchedule => names::TIME_TO_SCHEDULE,
        Transition::WarmupDuration => names::TIME_INIT_CONTAINER_RAN,
        Transition::TimeToStartWorkload => names::TIME_TO_START_WORKLOAD,
        Transition::WorkloadStartDelay => names::TIME_DELAY_OF_WORKLOAD,
    }
}

/// High-level interface for recording operator metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimerMetrics;

impl PrimerMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Increments the action counter for one write attempt.
    pub fn record_cron_action(&self, action: CronAction, success: bool) {
        counter!(
            names::CRONJOB_ACTION_TOTAL,
            labels::ACTION => action.as_str(),
            labels::OUTCOME => if success { "success" } else { "failure" },
        )
        .increment(1);
    }

    /// Records one transition duration in its histogram.
    pub fn observe_transition(&self, source_name: &str, node_pool: &str, observation: &Observation) {
        histogram!(
            histogram_for(observation.transition),
            labels::PRESCALE_CRON => source_name.to_string(),
            labels::NODE_POOL => node_pool.to_string(),
            labels::DURATION_TYPE => observation.sign.as_str(),
        )
        .record(observation.seconds);
    }
}
