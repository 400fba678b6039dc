//! Property-based tests for primer schedule derivation.
//!
//! These verify that a derived schedule fires exactly `warmup` minutes
//! before every fire of the original schedule, for any shiftable input.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use cronprimer_core::schedule::{primer_schedule, ShiftRejection, StandardSchedule};

fn hour_field() -> impl Strategy<Value = Option<u32>> {
    prop_oneof![Just(None), (0u32..24).prop_map(Some)]
}

fn render(minute: &str, hour: Option<u32>) -> String {
    let hour = hour.map_or_else(|| "*".to_string(), |h| h.to_string());
    format!("{minute} {hour} * * *")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every fire of the primer schedule is followed `warmup` minutes later by
    /// a fire of the original schedule.
    #[test]
    fn primer_fires_warmup_before_original(
        minute in 0u32..60,
        hour in hour_field(),
        warmup in 0u32..=60,
        offset_minutes in 0i64..(7 * 24 * 60),
    ) {
        let original = render(&minute.to_string(), hour);
        let primer = primer_schedule(&original, warmup, None).expect("shiftable");

        let original = StandardSchedule::parse(&original).unwrap();
        let primer = StandardSchedule::parse(&primer).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
            + Duration::minutes(offset_minutes);
        let lead = Duration::minutes(i64::from(warmup));

        let primed = primer.next_after(from).unwrap();
        prop_assert_eq!(original.next_after(from + lead).unwrap(), primed + lead);
    }

    /// Step expressions on an every-hour schedule keep their cadence.
    #[test]
    fn stepped_minutes_keep_cadence(
        step in prop::sample::select(vec![5u32, 10, 15, 20, 30]),
        warmup in 1u32..=30,
    ) {
        let original = render(&format!("*/{step}"), None);
        let primer = primer_schedule(&original, warmup, None).unwrap();
        let minutes: Vec<u32> = primer
            .split_whitespace()
            .next()
            .unwrap()
            .split(',')
            .map(|m| m.parse().unwrap())
            .collect();

        prop_assert_eq!(minutes.len() as u32, 60 / step);
        for m in minutes {
            prop_assert_eq!((m + warmup) % step, 0);
        }
    }

    /// The derived schedule is always itself a valid schedule.
    #[test]
    fn derived_schedules_validate(
        minute in 0u32..60,
        hour in hour_field(),
        warmup in 0u32..=60,
    ) {
        let primer = primer_schedule(&render(&minute.to_string(), hour), warmup, None).unwrap();
        prop_assert!(StandardSchedule::is_valid(&primer));
    }

    /// A warm-up reaching past the previous hour is always rejected.
    #[test]
    fn oversized_warmup_is_rejected(minute in 0u32..60, extra in 1u32..120) {
        let warmup = minute + 60 + extra;
        let err = primer_schedule(&render(&minute.to_string(), Some(5)), warmup, None)
            .unwrap_err();
        let is_exceeds_hour = matches!(err, ShiftRejection::WarmupExceedsHour { .. });
        prop_assert!(is_exceeds_hour);
    }

    /// A valid override is returned verbatim regardless of the original.
    #[test]
    fn valid_override_wins(minute in 0u32..60, hour in 0u32..24, warmup in 0u32..1000) {
        let primer = format!("{minute} {hour} * * *");
        prop_assert_eq!(
            primer_schedule("* * * * *", warmup, Some(&primer)).unwrap(),
            primer
        );
    }
}
