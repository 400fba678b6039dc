//! End-to-end contracts for lifecycle timing extraction across passes.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use cronprimer_core::high_water::HighWaterMarkCache;
use cronprimer_core::lifecycle::{
    DurationSign, Extraction, InstanceRef, LifecycleEvent, Milestone, Transition,
    TimingExtractor, TransitionTimings, WarmupStep,
};

const WARMUP_CONTAINER: &str = "injected-warmup";
// Next fire after creation (12:00:05) is 12:01:00, 55 seconds later.
const SCHEDULE: &str = "1 12 * * *";

fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 29, 12, 0, 5).unwrap()
}

fn at(offset_secs: i64) -> DateTime<Utc> {
    created_at() + Duration::seconds(offset_secs)
}

fn event(uid: &str, reason: &str, component: &str, path: Option<&str>, offset: i64) -> LifecycleEvent {
    LifecycleEvent {
        uid: uid.to_string(),
        reason: reason.to_string(),
        source_component: Some(component.to_string()),
        field_path: path.map(str::to_string),
        first_timestamp: at(offset),
        last_timestamp: at(offset),
    }
}

fn warmup_path() -> String {
    WarmupStep::init_container(WARMUP_CONTAINER)
        .field_path()
        .to_string()
}

fn full_history() -> Vec<LifecycleEvent> {
    let warmup = warmup_path();
    vec![
        event("scheduled", "Scheduled", "default-scheduler", None, 2),
        event("warmup-started", "Started", "kubelet", Some(&warmup), 3),
        event("pulling", "Pulling", "kubelet", Some("spec.containers{job}"), 58),
        event("started", "Started", "kubelet", Some("spec.containers{job}"), 60),
    ]
}

fn extractor() -> TimingExtractor {
    TimingExtractor::new(
        Arc::new(HighWaterMarkCache::default()),
        WarmupStep::init_container(WARMUP_CONTAINER),
    )
}

fn instance(schedule: &str) -> InstanceRef<'_> {
    InstanceRef {
        name: "autogen-nightly-1580299200",
        created_at: created_at(),
        original_schedule: schedule,
    }
}

fn computed(extraction: Extraction) -> TransitionTimings {
    match extraction {
        Extraction::Computed(timings) => timings,
        other => panic!("expected computed timings, got {other:?}"),
    }
}

#[test]
fn first_pass_reports_every_transition() {
    let timings = computed(
        extractor()
            .extract(instance(SCHEDULE), full_history(), at(61))
            .unwrap(),
    );

    assert_eq!(timings.transitions[&Transition::TimeToSchedule], Duration::seconds(2));
    assert_eq!(timings.transitions[&Transition::WarmupDuration], Duration::seconds(55));
    assert_eq!(timings.transitions[&Transition::TimeToStartWorkload], Duration::seconds(2));
    assert_eq!(timings.transitions[&Transition::WorkloadStartDelay], Duration::seconds(5));
    assert!(timings.partial_failure.is_none());
    assert_eq!(timings.milestone_at(Milestone::Scheduled), Some(at(2)));

    let delay = timings
        .observations()
        .into_iter()
        .find(|o| o.transition == Transition::WorkloadStartDelay)
        .unwrap();
    assert_eq!(delay.sign, DurationSign::Late);
    assert!((delay.seconds - 5.0).abs() < f64::EPSILON);
}

#[test]
fn unchanged_history_reports_nothing() {
    let extractor = extractor();
    extractor
        .extract(instance(SCHEDULE), full_history(), at(61))
        .unwrap();

    let second = extractor
        .extract(instance(SCHEDULE), full_history(), at(62))
        .unwrap();
    assert_eq!(second, Extraction::NothingNew);
}

#[test]
fn unclassified_new_event_reports_no_transitions() {
    let extractor = extractor();
    extractor
        .extract(instance(SCHEDULE), full_history(), at(61))
        .unwrap();

    let mut history = full_history();
    history.push(event("killing", "Killing", "kubelet", Some("spec.containers{job}"), 90));
    let timings = computed(
        extractor
            .extract(instance(SCHEDULE), history, at(91))
            .unwrap(),
    );
    assert!(timings.transitions.is_empty());
}

#[test]
fn transitions_are_reported_on_the_pass_their_events_arrive() {
    let extractor = extractor();
    let mut history = full_history();
    let started = history.pop().unwrap();

    let first = computed(
        extractor
            .extract(instance(SCHEDULE), history.clone(), at(59))
            .unwrap(),
    );
    assert_eq!(
        first.transitions.keys().copied().collect::<Vec<_>>(),
        vec![Transition::TimeToSchedule, Transition::WarmupDuration]
    );

    history.push(started);
    let second = computed(
        extractor
            .extract(instance(SCHEDULE), history, at(61))
            .unwrap(),
    );
    assert_eq!(
        second.transitions.keys().copied().collect::<Vec<_>>(),
        vec![Transition::TimeToStartWorkload, Transition::WorkloadStartDelay]
    );
}

#[test]
fn empty_history_leaves_no_mark() {
    let extractor = extractor();
    let result = extractor
        .extract(instance(SCHEDULE), Vec::new(), at(1))
        .unwrap();
    assert_eq!(result, Extraction::NoEvents);
    assert!(extractor.cache().is_empty().unwrap());
}

#[test]
fn unparseable_schedule_keeps_other_durations() {
    let timings = computed(
        extractor()
            .extract(instance("not a schedule"), full_history(), at(61))
            .unwrap(),
    );

    assert!(timings.partial_failure.is_some());
    assert!(!timings.transitions.contains_key(&Transition::WorkloadStartDelay));
    assert_eq!(timings.transitions.len(), 3);
}

#[test]
fn early_start_is_reported_as_early() {
    // Next fire after creation is 12:02:00, 115 seconds out; workload at +60s.
    let timings = computed(
        extractor()
            .extract(instance("2 12 * * *"), full_history(), at(61))
            .unwrap(),
    );
    let delay = timings
        .observations()
        .into_iter()
        .find(|o| o.transition == Transition::WorkloadStartDelay)
        .unwrap();
    assert_eq!(delay.duration, Duration::seconds(-55));
    assert_eq!(delay.sign, DurationSign::Early);
}

#[test]
fn expired_mark_treats_history_as_new() {
    let cache = Arc::new(HighWaterMarkCache::new(Duration::minutes(1), 10));
    let extractor = TimingExtractor::new(
        Arc::clone(&cache),
        WarmupStep::init_container(WARMUP_CONTAINER),
    );
    extractor
        .extract(instance(SCHEDULE), full_history(), at(61))
        .unwrap();

    let later = extractor
        .extract(instance(SCHEDULE), full_history(), at(61) + Duration::minutes(2))
        .unwrap();
    assert_eq!(computed(later).transitions.len(), 4);
}

#[test]
fn start_delay_matches_either_restricted_day() {
    // 2020-01-29 is a Wednesday but not the 15th.
    let timings = computed(
        extractor()
            .extract(instance("1 12 15 * 3"), full_history(), at(61))
            .unwrap(),
    );
    assert_eq!(timings.transitions[&Transition::WorkloadStartDelay], Duration::seconds(5));
}
