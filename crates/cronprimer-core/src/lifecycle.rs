//! Lifecycle timing extraction for primed workload instances.
//!
//! A primed pod runs an injected warm-up init container that waits for the
//! original schedule, then hands over to the real workload. Its event history
//! tells how long each stage took:
//!
//! ```text
//! created ─► Scheduled ─► warm-up Started ─► workload Pulling/Pulled ─► workload Started
//!        time-to-schedule   warm-up-duration   time-to-start-workload
//! created ─► (next fire of original schedule) ······► workload Started
//!                         workload-start-delay
//! ```
//!
//! The event list only grows between passes, so each pass works out which
//! events are new since the instance's high-water mark and reports a
//! transition only on the pass where one of its events first appears.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, ScheduleParseError};
use crate::high_water::HighWaterMarkCache;
use crate::schedule::StandardSchedule;

/// Source component tag of events emitted by the node agent.
pub const NODE_AGENT_COMPONENT: &str = "kubelet";

/// Reason attached by the scheduler when a pod is bound to a node.
pub const SCHEDULED_REASON: &str = "Scheduled";

const STARTED_REASON: &str = "Started";
const PULLING_REASON: &str = "Pulling";
const PULLED_REASON: &str = "Pulled";

/// One lifecycle event attached to a workload instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Unique event identifier.
    pub uid: String,
    /// Machine-readable reason (`Scheduled`, `Pulling`, `Started`, ...).
    pub reason: String,
    /// Component that emitted the event.
    pub source_component: Option<String>,
    /// Field path of the container the event concerns.
    pub field_path: Option<String>,
    /// When the event was first observed.
    pub first_timestamp: DateTime<Utc>,
    /// When the event was most recently observed.
    pub last_timestamp: DateTime<Utc>,
}

/// Named points in a workload instance's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Milestone {
    /// The instance was bound to a node.
    Scheduled,
    /// The warm-up step started.
    WarmupStarted,
    /// The warm-up step exited and the workload image is being pulled.
    WarmupFinished,
    /// A workload container started.
    WorkloadStarted,
}

/// Durations reported for each workload instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Transition {
    /// Creation to scheduled.
    TimeToSchedule,
    /// Warm-up started to warm-up finished.
    WarmupDuration,
    /// Warm-up finished to workload started.
    TimeToStartWorkload,
    /// Expected fire time of the original schedule to workload started.
    WorkloadStartDelay,
}

impl Transition {
    /// All transitions in reporting order.
    pub const ALL: [Self; 4] = [
        Self::TimeToSchedule,
        Self::WarmupDuration,
        Self::TimeToStartWorkload,
        Self::WorkloadStartDelay,
    ];

    /// Stable name used in narration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TimeToSchedule => "time-to-schedule",
            Self::WarmupDuration => "warm-up-duration",
            Self::TimeToStartWorkload => "time-to-start-workload",
            Self::WorkloadStartDelay => "workload-start-delay",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a duration ran ahead of or behind its reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationSign {
    /// Negative duration.
    Early,
    /// Zero or positive duration.
    Late,
}

impl DurationSign {
    /// Label value used on duration histograms.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::Late => "late",
        }
    }
}

/// A duration ready to be recorded: its sign and absolute magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// The transition measured.
    pub transition: Transition,
    /// The raw signed duration.
    pub duration: Duration,
    /// Early or late.
    pub sign: DurationSign,
    /// Absolute magnitude in seconds.
    pub seconds: f64,
}

impl Observation {
    /// Splits a signed duration into sign and magnitude.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // millisecond precision is plenty
    pub fn new(transition: Transition, duration: Duration) -> Self {
        let millis = duration.num_milliseconds();
        let sign = if millis < 0 {
            DurationSign::Early
        } else {
            DurationSign::Late
        };
        Self {
            transition,
            duration,
            sign,
            seconds: millis.unsigned_abs() as f64 / 1000.0,
        }
    }
}

/// Identifies the injected warm-up step in event field paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmupStep {
    field_path: String,
}

impl WarmupStep {
    /// Builds the matcher for an init container named `container_name`.
    #[must_use]
    pub fn init_container(container_name: &str) -> Self {
        Self {
            field_path: format!("spec.initContainers{{{container_name}}}"),
        }
    }

    /// The field path events about the warm-up step carry.
    #[must_use]
    pub fn field_path(&self) -> &str {
        &self.field_path
    }

    fn matches(&self, event: &LifecycleEvent) -> bool {
        event.field_path.as_deref() == Some(self.field_path.as_str())
    }
}

struct EventFacts<'a> {
    reason: &'a str,
    from_node_agent: bool,
    concerns_warmup: bool,
}

type Rule = (Milestone, fn(&EventFacts<'_>) -> bool);

fn is_scheduled(e: &EventFacts<'_>) -> bool {
    e.reason == SCHEDULED_REASON
}

fn is_warmup_start(e: &EventFacts<'_>) -> bool {
    e.from_node_agent && e.concerns_warmup && e.reason == STARTED_REASON
}

// The workload image is pulled once the warm-up step has exited.
fn is_workload_pull(e: &EventFacts<'_>) -> bool {
    e.from_node_agent
        && !e.concerns_warmup
        && (e.reason == PULLING_REASON || e.reason == PULLED_REASON)
}

fn is_workload_start(e: &EventFacts<'_>) -> bool {
    e.from_node_agent && !e.concerns_warmup && e.reason == STARTED_REASON
}

/// Classification rules, evaluated in order; the first match wins.
const RULES: [Rule; 4] = [
    (Milestone::Scheduled, is_scheduled),
    (Milestone::WarmupStarted, is_warmup_start),
    (Milestone::WarmupFinished, is_workload_pull),
    (Milestone::WorkloadStarted, is_workload_start),
];

/// Maps an event to the milestone it marks, if any.
#[must_use]
pub fn classify(event: &LifecycleEvent, warmup: &WarmupStep) -> Option<Milestone> {
    let facts = EventFacts {
        reason: &event.reason,
        from_node_agent: event.source_component.as_deref() == Some(NODE_AGENT_COMPONENT),
        concerns_warmup: warmup.matches(event),
    };
    RULES
        .iter()
        .find(|(_, applies)| applies(&facts))
        .map(|(milestone, _)| *milestone)
}

/// Orders events most recent first by first-observed time.
pub fn sort_latest_first(events: &mut [LifecycleEvent]) {
    events.sort_by(|a, b| b.first_timestamp.cmp(&a.first_timestamp));
}

/// UIDs of events newer than the high-water mark.
///
/// Walks `latest_first` until the event whose UID equals `mark`. Without a
/// mark every event is new.
#[must_use]
pub fn new_since(latest_first: &[LifecycleEvent], mark: Option<&str>) -> HashSet<String> {
    latest_first
        .iter()
        .take_while(|event| mark != Some(event.uid.as_str()))
        .map(|event| event.uid.clone())
        .collect()
}

/// Moves the high-water mark of `instance` to the most recent event.
///
/// Does nothing when there are no events.
///
/// # Errors
///
/// Returns an error if the cache lock is poisoned.
pub fn advance(
    cache: &HighWaterMarkCache,
    instance: &str,
    latest_first: &[LifecycleEvent],
    now: DateTime<Utc>,
) -> Result<()> {
    match latest_first.first() {
        Some(latest) => cache.record(instance, &latest.uid, now),
        None => Ok(()),
    }
}

/// Milestones and newly computed transition durations for one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTimings {
    /// Instance creation time.
    pub created_at: DateTime<Utc>,
    /// The event kept for each milestone.
    pub milestones: BTreeMap<Milestone, LifecycleEvent>,
    /// Durations computed on this pass.
    pub transitions: BTreeMap<Transition, Duration>,
    /// Set when the original schedule could not be evaluated; the start
    /// delay is then missing but the other durations stand.
    pub partial_failure: Option<ScheduleParseError>,
}

impl TransitionTimings {
    /// First-observed time of `milestone`, if seen.
    #[must_use]
    pub fn milestone_at(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
        self.milestones.get(&milestone).map(|e| e.first_timestamp)
    }

    /// The computed transitions as signed observations.
    #[must_use]
    pub fn observations(&self) -> Vec<Observation> {
        self.transitions
            .iter()
            .map(|(transition, duration)| Observation::new(*transition, *duration))
            .collect()
    }
}

/// Classifies `all_events` and computes transitions with at least one new event.
///
/// `all_events` must be sorted latest first; when several events mark the same
/// milestone the one seen last in that order is kept.
#[must_use]
pub fn compute_timings(
    all_events: &[LifecycleEvent],
    new_events: &HashSet<String>,
    created_at: DateTime<Utc>,
    original_schedule: &str,
    warmup: &WarmupStep,
) -> TransitionTimings {
    let mut milestones = BTreeMap::new();
    for event in all_events {
        if let Some(milestone) = classify(event, warmup) {
            milestones.insert(milestone, event.clone());
        }
    }

    let mut timings = TransitionTimings {
        created_at,
        milestones,
        transitions: BTreeMap::new(),
        partial_failure: None,
    };

    let reportable = |required: &[Milestone]| -> Option<Vec<DateTime<Utc>>> {
        let events: Option<Vec<&LifecycleEvent>> =
            required.iter().map(|m| timings.milestones.get(m)).collect();
        let events = events?;
        events
            .iter()
            .any(|e| new_events.contains(&e.uid))
            .then(|| events.iter().map(|e| e.last_timestamp).collect())
    };

    let mut computed = Vec::new();
    if let Some(at) = reportable(&[Milestone::Scheduled]) {
        computed.push((Transition::TimeToSchedule, at[0] - created_at));
    }
    if let Some(at) = reportable(&[Milestone::WarmupStarted, Milestone::WarmupFinished]) {
        computed.push((Transition::WarmupDuration, at[1] - at[0]));
    }
    if let Some(at) = reportable(&[Milestone::WarmupFinished, Milestone::WorkloadStarted]) {
        computed.push((Transition::TimeToStartWorkload, at[1] - at[0]));
    }
    let workload_started = reportable(&[Milestone::WorkloadStarted]);

    timings.transitions.extend(computed);

    if let Some(at) = workload_started {
        match expected_fire_time(original_schedule, created_at) {
            Ok(expected) => {
                timings
                    .transitions
                    .insert(Transition::WorkloadStartDelay, at[0] - expected);
            }
            Err(err) => timings.partial_failure = Some(err),
        }
    }

    timings
}

fn expected_fire_time(
    schedule: &str,
    created_at: DateTime<Utc>,
) -> std::result::Result<DateTime<Utc>, ScheduleParseError> {
    StandardSchedule::parse(schedule)?
        .next_after(created_at)
        .ok_or_else(|| ScheduleParseError::new(schedule, "schedule has no upcoming fire time"))
}

/// What one extraction pass found.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The instance has no events yet.
    NoEvents,
    /// Every event was already processed on an earlier pass.
    NothingNew,
    /// New events arrived; these are the resulting timings.
    Computed(TransitionTimings),
}

/// The workload instance being measured.
#[derive(Debug, Clone, Copy)]
pub struct InstanceRef<'a> {
    /// Instance name, the high-water mark key.
    pub name: &'a str,
    /// Instance creation time.
    pub created_at: DateTime<Utc>,
    /// Schedule of the source specification the instance belongs to.
    pub original_schedule: &'a str,
}

/// Runs extraction passes against a shared high-water mark cache.
#[derive(Debug, Clone)]
pub struct TimingExtractor {
    cache: Arc<HighWaterMarkCache>,
    warmup: WarmupStep,
}

impl TimingExtractor {
    /// Creates an extractor using `cache` for de-duplication.
    #[must_use]
    pub fn new(cache: Arc<HighWaterMarkCache>, warmup: WarmupStep) -> Self {
        Self { cache, warmup }
    }

    /// The cache backing this extractor.
    #[must_use]
    pub fn cache(&self) -> &Arc<HighWaterMarkCache> {
        &self.cache
    }

    /// Processes the full current event history of `instance`.
    ///
    /// The high-water mark advances to the most recent event whenever there
    /// is at least one event, whether or not anything new was found.
    ///
    /// # Errors
    ///
    /// Returns an error only if the cache lock is poisoned.
    pub fn extract(
        &self,
        instance: InstanceRef<'_>,
        mut events: Vec<LifecycleEvent>,
        now: DateTime<Utc>,
    ) -> Result<Extraction> {
        if events.is_empty() {
            return Ok(Extraction::NoEvents);
        }
        sort_latest_first(&mut events);

        let mark = self.cache.get(instance.name, now)?;
        let new_events = new_since(&events, mark.as_deref());
        advance(&self.cache, instance.name, &events, now)?;

        if new_events.is_empty() {
            tracing::debug!(instance = %instance.name, "no new events since last pass");
            return Ok(Extraction::NothingNew);
        }

        Ok(Extraction::Computed(compute_timings(
            &events,
            &new_events,
            instance.created_at,
            instance.original_schedule,
            &self.warmup,
        )))
    }
}

/// Formats a duration compactly, e.g. `5s`, `-1m30s`, `2.5s`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.num_milliseconds();
    let sign = if millis < 0 { "-" } else { "" };
    let millis = millis.unsigned_abs();

    let hours = millis / 3_600_000;
    let minutes = (millis / 60_000) % 60;
    let seconds = (millis / 1000) % 60;
    let fraction = millis % 1000;

    let seconds = if fraction == 0 {
        format!("{seconds}s")
    } else {
        let fraction = format!("{fraction:03}");
        format!("{seconds}.{}s", fraction.trim_end_matches('0'))
    };

    if hours > 0 {
        format!("{sign}{hours}h{minutes}m{seconds}")
    } else if minutes > 0 {
        format!("{sign}{minutes}m{seconds}")
    } else {
        format!("{sign}{seconds}")
    }
}
