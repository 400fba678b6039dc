//! Standard five-field cron schedules.
//!
//! Users write schedules in the standard `minute hour day-of-month month
//! day-of-week` format that batch `CronJob` objects accept. Evaluation is
//! delegated to the `cron` crate, which expects a seconds-first expression and
//! numbers days of the week from 1 (Sunday) to 7 (Saturday), so expressions are
//! translated before being handed over.
//!
//! When both day-of-month and day-of-week are restricted a standard schedule
//! fires on days matching *either* field, while the `cron` crate requires
//! both. Such schedules are evaluated as two schedules, one per day field, and
//! the earlier fire time wins.

mod shift;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

pub use crate::error::ScheduleParseError;
pub use shift::{primer_schedule, CronFields, ShiftRejection};

/// Number of fields in a standard cron expression.
pub const STANDARD_FIELD_COUNT: usize = 5;

/// A validated standard cron schedule.
#[derive(Clone)]
pub struct StandardSchedule {
    expression: String,
    schedules: Vec<Schedule>,
}

impl fmt::Debug for StandardSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardSchedule")
            .field("expression", &self.expression)
            .finish_non_exhaustive()
    }
}

impl StandardSchedule {
    /// Parses a standard five-field expression or a `@` descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleParseError`] if the expression does not have exactly
    /// five fields, contains out-of-range values, or is otherwise rejected by
    /// the cron evaluator.
    pub fn parse(expression: &str) -> Result<Self, ScheduleParseError> {
        let trimmed = expression.trim();
        let standard = expand_descriptor(trimmed).unwrap_or(trimmed);

        let fields: Vec<&str> = standard.split_whitespace().collect();
        if fields.len() != STANDARD_FIELD_COUNT {
            return Err(ScheduleParseError::new(
                expression,
                format!(
                    "expected exactly {STANDARD_FIELD_COUNT} fields, found {}",
                    fields.len()
                ),
            ));
        }

        let [minute, hour, day_of_month, month, day_of_week] = [
            fields[0], fields[1], fields[2], fields[3], fields[4],
        ];
        let day_of_week = translate_day_of_week(day_of_week)
            .map_err(|message| ScheduleParseError::new(expression, message))?;

        let day_pairs = if is_unrestricted(day_of_month) || is_unrestricted(&day_of_week) {
            vec![(day_of_month, day_of_week.as_str())]
        } else {
            vec![(day_of_month, "*"), ("*", day_of_week.as_str())]
        };

        let schedules = day_pairs
            .into_iter()
            .map(|(dom, dow)| {
                Schedule::from_str(&format!("0 {minute} {hour} {dom} {month} {dow}"))
                    .map_err(|e| ScheduleParseError::new(expression, e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            expression: expression.to_string(),
            schedules,
        })
    }

    /// Returns true if `expression` is a valid standard schedule.
    #[must_use]
    pub fn is_valid(expression: &str) -> bool {
        Self::parse(expression).is_ok()
    }

    /// The expression as written by the user.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Returns the first fire time strictly after `after`.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(&after).next())
            .min()
    }
}

impl FromStr for StandardSchedule {
    type Err = ScheduleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn expand_descriptor(expression: &str) -> Option<&'static str> {
    let expanded = match expression.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => "0 0 1 1 *",
        "@monthly" => "0 0 1 * *",
        "@weekly" => "0 0 * * 0",
        "@daily" | "@midnight" => "0 0 * * *",
        "@hourly" => "0 * * * *",
        _ => return None,
    };
    Some(expanded)
}

fn is_unrestricted(field: &str) -> bool {
    field == "*" || field == "?"
}

/// Converts a standard day-of-week field (0 = Sunday, 6 = Saturday) to the
/// 1 = Sunday numbering used by the evaluator. Names and wildcards pass
/// through.
fn translate_day_of_week(field: &str) -> Result<String, String> {
    let mut parts = Vec::new();

    for element in field.split(',') {
        let (base, step) = match element.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (element, None),
        };

        let translated = if let Some((start, end)) = base.split_once('-') {
            format!("{}-{}", translate_day(start)?, translate_day(end)?)
        } else {
            translate_day(base)?
        };

        match step {
            Some(step) => parts.push(format!("{translated}/{step}")),
            None => parts.push(translated),
        }
    }

    Ok(parts.join(","))
}

fn translate_day(token: &str) -> Result<String, String> {
    if token == "*" || token == "?" || token.chars().any(|c| c.is_ascii_alphabetic()) {
        return Ok(token.to_string());
    }
    let day: u32 = token
        .parse()
        .map_err(|_| format!("invalid day-of-week value {token:?}"))?;
    match day {
        0..=6 => Ok((day + 1).to_string()),
        _ => Err(format!("day-of-week value {day} out of range 0-6")),
    }
}
