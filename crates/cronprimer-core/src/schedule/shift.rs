//! Primer schedule derivation.
//!
//! A primer schedule fires `warmup_minutes` before the original schedule so a
//! warm-up step can run ahead of the real workload. The rewrite works on the
//! minute field only and refuses any expression where moving the minute back
//! would require an ambiguous change to the hour or day fields.
//!
//! ## Pipeline
//!
//! ```text
//! parse → reject every-minute → normalize minutes → deduct warm-up
//!       → adjust hour → reassemble → validate
//! ```
//!
//! Every stage returns a [`ShiftRejection`] naming exactly what could not be
//! rewritten.

use std::fmt;

use super::StandardSchedule;
use crate::error::ScheduleParseError;

const MINUTES_PER_HOUR: u32 = 60;
const LAST_HOUR: u32 = 23;

/// Why a primer schedule could not be derived.
///
/// Rejections are permanent for a given input: retrying without changing the
/// schedule or warm-up will produce the same rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShiftRejection {
    /// The explicit primer schedule override is not a valid schedule.
    #[error("primerSchedule provided is invalid: {0}")]
    InvalidOverride(#[source] ScheduleParseError),

    /// The original schedule is not a valid schedule.
    #[error("schedule provided is invalid: {0}")]
    InvalidSchedule(#[source] ScheduleParseError),

    /// The minute field is `*`; there is no earlier minute to prime on.
    #[error("can't create primer schedule on something that runs every minute")]
    EveryMinuteUnsupported,

    /// The minute field mixes steps or ranges with lists.
    #[error("can't combine step, range and list expressions in minute field {field:?}")]
    ExpressionCombinationUnsupported {
        /// The minute field as written.
        field: String,
    },

    /// A minute token is not an integer.
    #[error("can't parse minute value {value:?} to an integer")]
    InvalidMinuteValue {
        /// The offending token.
        value: String,
    },

    /// A step expression uses a step of zero.
    #[error("step value in minute field {field:?} must be greater than zero")]
    InvalidStep {
        /// The minute field as written.
        field: String,
    },

    /// The warm-up reaches back more than one hour from a minute value.
    #[error("warm-up of {warmup_minutes} minutes reaches back more than an hour from minute {minute}")]
    WarmupExceedsHour {
        /// The minute value being shifted.
        minute: u32,
        /// The requested warm-up.
        warmup_minutes: u32,
    },

    /// The hour field is an expression and cannot be decremented.
    #[error("can't adjust special characters in cron-hour argument {hour:?}")]
    CannotAdjustHour {
        /// The hour field as written.
        hour: String,
    },

    /// Several minute values share one hour field that would need adjusting.
    #[error("can't adjust hour for minute expression with multiple values")]
    MultipleValueHourAdjustUnsupported,

    /// Priming would move the schedule onto a different day.
    #[error("unsupported cron, can't create primer schedule that crosses a day boundary")]
    DayRolloverUnsupported,

    /// The rewritten schedule failed validation.
    #[error("derived primer schedule is invalid: {0}")]
    InvalidResult(#[source] ScheduleParseError),
}

/// The five fields of a standard cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronFields {
    /// Minute field.
    pub minute: String,
    /// Hour field.
    pub hour: String,
    /// Day-of-month field.
    pub day_of_month: String,
    /// Month field.
    pub month: String,
    /// Day-of-week field.
    pub day_of_week: String,
}

impl CronFields {
    /// Splits a validated expression into its fields.
    ///
    /// Descriptors such as `@hourly` have a single field and are reported as
    /// an unparseable minute value.
    fn split(expression: &str) -> Result<Self, ShiftRejection> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        match fields.as_slice() {
            [minute, hour, day_of_month, month, day_of_week] => Ok(Self {
                minute: (*minute).to_string(),
                hour: (*hour).to_string(),
                day_of_month: (*day_of_month).to_string(),
                month: (*month).to_string(),
                day_of_week: (*day_of_week).to_string(),
            }),
            _ => Err(ShiftRejection::InvalidMinuteValue {
                value: expression.trim().to_string(),
            }),
        }
    }

    /// True when the expression only fires on particular days.
    fn is_day_specific(&self) -> bool {
        self.day_of_month != "*" || self.month != "*" || self.day_of_week != "*"
    }
}

impl fmt::Display for CronFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.day_of_week
        )
    }
}

/// Minute values after the warm-up has been deducted.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeductedMinutes {
    values: Vec<u32>,
    rolled_over: usize,
}

/// Derives the schedule the primed job runs on.
///
/// A non-empty `explicit_override` wins when it is valid. Otherwise the
/// minute field of `original` is moved back by `warmup_minutes`, decrementing
/// the hour when the minute wraps below zero.
///
/// # Errors
///
/// Returns the [`ShiftRejection`] of the first pipeline stage that cannot
/// rewrite the expression.
pub fn primer_schedule(
    original: &str,
    warmup_minutes: u32,
    explicit_override: Option<&str>,
) -> Result<String, ShiftRejection> {
    if let Some(primer) = explicit_override.filter(|s| !s.trim().is_empty()) {
        StandardSchedule::parse(primer).map_err(ShiftRejection::InvalidOverride)?;
        return Ok(primer.to_string());
    }

    StandardSchedule::parse(original).map_err(ShiftRejection::InvalidSchedule)?;
    let mut fields = CronFields::split(original)?;

    if fields.minute == "*" {
        return Err(ShiftRejection::EveryMinuteUnsupported);
    }

    let minutes = normalize_minutes(&fields.minute)?;
    let deducted = deduct_warmup(&minutes, warmup_minutes)?;
    adjust_hour(&mut fields, &deducted)?;

    fields.minute = deducted
        .values
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let primer = fields.to_string();
    StandardSchedule::parse(&primer).map_err(ShiftRejection::InvalidResult)?;
    Ok(primer)
}

/// Expands a minute field into an explicit list of values.
///
/// `start/step` and `*/step` become every step from `start` (or 0) to the end
/// of the hour; `a-b` becomes every minute from `a` to `b`.
fn normalize_minutes(field: &str) -> Result<Vec<u32>, ShiftRejection> {
    let combination = || ShiftRejection::ExpressionCombinationUnsupported {
        field: field.to_string(),
    };

    if let Some((start, step)) = field.split_once('/') {
        if field.contains(',') || start.contains('-') {
            return Err(combination());
        }
        let start = if start == "*" { 0 } else { parse_minute(start)? };
        let step = parse_minute(step)?;
        if step == 0 {
            return Err(ShiftRejection::InvalidStep {
                field: field.to_string(),
            });
        }
        return Ok((start..MINUTES_PER_HOUR).step_by(step as usize).collect());
    }

    if let Some((start, end)) = field.split_once('-') {
        if field.contains(',') {
            return Err(combination());
        }
        let values: Vec<u32> = (parse_minute(start)?..=parse_minute(end)?).collect();
        if values.is_empty() {
            return Err(ShiftRejection::InvalidMinuteValue {
                value: field.to_string(),
            });
        }
        return Ok(values);
    }

    field.split(',').map(parse_minute).collect()
}

fn parse_minute(value: &str) -> Result<u32, ShiftRejection> {
    value
        .parse()
        .map_err(|_| ShiftRejection::InvalidMinuteValue {
            value: value.to_string(),
        })
}

/// Moves every minute back by the warm-up, wrapping into the previous hour.
fn deduct_warmup(minutes: &[u32], warmup_minutes: u32) -> Result<DeductedMinutes, ShiftRejection> {
    let mut values = Vec::with_capacity(minutes.len());
    let mut rolled_over = 0;

    for &minute in minutes {
        if minute >= warmup_minutes {
            values.push(minute - warmup_minutes);
        } else if minute + MINUTES_PER_HOUR >= warmup_minutes {
            values.push(minute + MINUTES_PER_HOUR - warmup_minutes);
            rolled_over += 1;
        } else {
            return Err(ShiftRejection::WarmupExceedsHour {
                minute,
                warmup_minutes,
            });
        }
    }

    Ok(DeductedMinutes {
        values,
        rolled_over,
    })
}

/// Moves the hour back by one when a minute wrapped into the previous hour.
fn adjust_hour(fields: &mut CronFields, deducted: &DeductedMinutes) -> Result<(), ShiftRejection> {
    if deducted.rolled_over == 0 {
        return Ok(());
    }
    let multiple_values = deducted.values.len() > 1;

    if fields.hour == "*" {
        // Every hour fires, so a wrapped minute lands in the previous hour's
        // slot. A lone minute on a restricted day would miss the first fire.
        if !multiple_values && fields.is_day_specific() {
            return Err(ShiftRejection::DayRolloverUnsupported);
        }
        return Ok(());
    }

    if multiple_values {
        return Err(ShiftRejection::MultipleValueHourAdjustUnsupported);
    }

    let hour: u32 = fields
        .hour
        .parse()
        .map_err(|_| ShiftRejection::CannotAdjustHour {
            hour: fields.hour.clone(),
        })?;

    fields.hour = match hour.checked_sub(1) {
        Some(previous) => previous.to_string(),
        None if fields.is_day_specific() => return Err(ShiftRejection::DayRolloverUnsupported),
        None => LAST_HOUR.to_string(),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift(original: &str, warmup: u32) -> Result<String, ShiftRejection> {
        primer_schedule(original, warmup, None)
    }

    #[test]
    fn shifts_specific_minute() {
        assert_eq!(shift("30 * * 10 *", 5).unwrap(), "25 * * 10 *");
    }

    #[test]
    fn adjusts_hour_across_midnight() {
        assert_eq!(shift("0 0 * * *", 10).unwrap(), "50 23 * * *");
    }

    #[test]
    fn adjusts_integer_hour() {
        assert_eq!(shift("5 7 1 * *", 10).unwrap(), "55 6 1 * *");
    }

    #[test]
    fn expands_step_values() {
        assert_eq!(shift("0/15 * 1 * *", 10).unwrap(), "50,5,20,35 * 1 * *");
        assert_eq!(shift("*/30 * 1 * *", 10).unwrap(), "50,20 * 1 * *");
        assert_eq!(shift("15/30 5 * * *", 5).unwrap(), "10,40 5 * * *");
    }

    #[test]
    fn expands_ranges() {
        assert_eq!(
            shift("15-20 12 * * 5", 5).unwrap(),
            "10,11,12,13,14,15 12 * * 5"
        );
    }

    #[test]
    fn shifts_lists_and_leaves_other_fields_alone() {
        assert_eq!(shift("5,12,48,56 * * * 5", 10).unwrap(), "55,2,38,46 * * * 5");
        assert_eq!(shift("30 14-16 * * *", 10).unwrap(), "20 14-16 * * *");
        assert_eq!(shift("5 * */12 * 1,2", 5).unwrap(), "0 * */12 * 1,2");
    }

    #[test]
    fn zero_warmup_only_normalizes() {
        assert_eq!(shift("0/20 3 * * *", 0).unwrap(), "0,20,40 3 * * *");
    }

    #[test]
    fn full_hour_warmup_moves_hour() {
        assert_eq!(shift("15 6 * * *", 60).unwrap(), "15 5 * * *");
    }

    #[test]
    fn rejects_every_minute() {
        assert_eq!(
            shift("* 0 * * *", 5),
            Err(ShiftRejection::EveryMinuteUnsupported)
        );
    }

    #[test]
    fn rejects_invalid_schedules() {
        assert!(matches!(
            shift("* 0 * * * *", 5),
            Err(ShiftRejection::InvalidSchedule(_))
        ));
        assert!(matches!(
            shift("wibble", 5),
            Err(ShiftRejection::InvalidSchedule(_))
        ));
    }

    #[test]
    fn rejects_combined_expressions() {
        assert!(matches!(
            shift("15-17,0/30 * * * *", 5),
            Err(ShiftRejection::ExpressionCombinationUnsupported { .. })
        ));
        assert!(matches!(
            shift("1,5-7 * * * *", 5),
            Err(ShiftRejection::ExpressionCombinationUnsupported { .. })
        ));
    }

    #[test]
    fn rejects_hour_expressions_that_need_adjusting() {
        assert_eq!(
            shift("0 14-16 * * *", 10),
            Err(ShiftRejection::CannotAdjustHour {
                hour: "14-16".into()
            })
        );
    }

    #[test]
    fn rejects_multiple_values_needing_hour_adjustment() {
        assert_eq!(
            shift("0-15 0 * * *", 10),
            Err(ShiftRejection::MultipleValueHourAdjustUnsupported)
        );
        assert_eq!(
            shift("0,30 5 * * *", 10),
            Err(ShiftRejection::MultipleValueHourAdjustUnsupported)
        );
    }

    #[test]
    fn rejects_day_rollover() {
        assert_eq!(
            shift("0 0 * * 5", 10),
            Err(ShiftRejection::DayRolloverUnsupported)
        );
        assert_eq!(
            shift("0 * * * 5", 10),
            Err(ShiftRejection::DayRolloverUnsupported)
        );
        assert_eq!(
            shift("0 0 1 * *", 10),
            Err(ShiftRejection::DayRolloverUnsupported)
        );
    }

    #[test]
    fn rejects_warmup_longer_than_an_hour_back() {
        assert_eq!(
            shift("0 5 * * *", 90),
            Err(ShiftRejection::WarmupExceedsHour {
                minute: 0,
                warmup_minutes: 90
            })
        );
    }

    #[test]
    fn rejects_descriptors() {
        assert!(matches!(
            shift("@hourly", 5),
            Err(ShiftRejection::InvalidMinuteValue { .. })
        ));
    }

    #[test]
    fn valid_override_is_returned_verbatim() {
        let primer = primer_schedule("* * * * *", 10, Some("30 * 15 * *")).unwrap();
        assert_eq!(primer, "30 * 15 * *");
    }

    #[test]
    fn invalid_override_is_rejected() {
        assert!(matches!(
            primer_schedule("* * * * *", 10, Some("wibble")),
            Err(ShiftRejection::InvalidOverride(_))
        ));
    }

    #[test]
    fn blank_override_falls_back_to_shifting() {
        assert_eq!(
            primer_schedule("30 * * * *", 10, Some("  ")).unwrap(),
            "20 * * * *"
        );
    }

    #[test]
    fn shifting_is_repeatable() {
        let first = shift("0/15 * 1 * *", 10);
        let second = shift("0/15 * 1 * *", 10);
        assert_eq!(first, second);
    }

    #[test]
    fn day_of_week_seven_is_an_invalid_schedule() {
        assert!(matches!(
            shift("30 6 * * 7", 10),
            Err(ShiftRejection::InvalidSchedule(_))
        ));
        assert!(matches!(
            primer_schedule("0 0 * * *", 10, Some("50 23 * * 7")),
            Err(ShiftRejection::InvalidOverride(_))
        ));
        assert_eq!(shift("30 6 * * 0", 10).unwrap(), "20 6 * * 0");
    }
}
