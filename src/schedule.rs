//! Five-field schedule expressions.
//!
//! Expressions use the standard crontab layout:
//!
//! ```text
//! min   hour   day of month   month   day of week
//! *     *      *              *       *
//! ```
//!
//! Matching is delegated to the [cron](https://docs.rs/cron) crate, which
//! expects a leading seconds field and numbers weekdays `1-7` from Sunday.
//! [`ScheduleExpression::parse`] bridges both differences once, up front.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Timelike};

use crate::error::CronError;
use crate::Result;

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A parsed schedule expression.
///
/// Two expressions are equal when their source strings are equal, even if
/// they describe the same instants.
#[derive(Clone)]
pub struct ScheduleExpression {
    source: String,
    schedule: cron::Schedule,
}

impl ScheduleExpression {
    /// Parses a five-field expression such as `*/5 * * * *` or `0 0 * * 0`.
    ///
    /// # Errors
    ///
    /// Returns [`CronError::Configuration`] when the expression does not have
    /// exactly five fields, and [`CronError::ParseError`] when the `cron`
    /// crate rejects one of the fields.
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        let schedule = cron::Schedule::from_str(&normalize(source)?)?;
        Ok(ScheduleExpression {
            source: source.to_string(),
            schedule,
        })
    }

    /// The expression as it was written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the expression fires during the minute containing `at`.
    pub fn matches<Z>(&self, at: &DateTime<Z>) -> bool
    where
        Z: TimeZone,
    {
        self.schedule.includes(truncate_to_minute(at.clone()))
    }
}

impl PartialEq for ScheduleExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for ScheduleExpression {}

impl fmt::Debug for ScheduleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScheduleExpression")
            .field(&self.source)
            .finish()
    }
}

impl fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for ScheduleExpression {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self> {
        ScheduleExpression::parse(s)
    }
}

/// Zeroes the seconds and sub-second part of `at`.
pub fn truncate_to_minute<Z>(at: DateTime<Z>) -> DateTime<Z>
where
    Z: TimeZone,
{
    let nanos = u64::from(at.second()) * 1_000_000_000 + u64::from(at.nanosecond());
    at - chrono::Duration::nanoseconds(nanos as i64)
}

/// Rewrites a five-field expression into the six-field form `cron` parses.
fn normalize(source: &str) -> Result<String> {
    let fields: Vec<&str> = source.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(CronError::config(format!(
            "expected 5 fields in schedule expression `{}`, found {}",
            source,
            fields.len()
        )));
    }

    Ok(format!(
        "0 {} {} {} {} {}",
        fields[0],
        fields[1],
        fields[2],
        fields[3],
        day_of_week(fields[4])
    ))
}

/// Translates numeric weekdays (`0-7`, Sunday twice) into names.
fn day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };

            // `N/step` means `N-7/step`.
            let open_ended;
            let range = match (range.parse::<u32>(), step) {
                (Ok(start), Some(_)) if start <= 7 => {
                    open_ended = format!("{}-7", start);
                    open_ended.as_str()
                }
                _ => range,
            };

            let translated = match range.split_once('-') {
                Some(("7", "7")) => return "SUN".to_string(),
                Some((start, "7")) => {
                    // `cron` cannot wrap a range past Saturday, so Sunday is listed on its own.
                    let lands_on_sunday = match (start.parse::<u32>(), step) {
                        (Ok(start), Some(step)) => step
                            .parse::<u32>()
                            .map(|step| step > 0 && start <= 7 && (7 - start) % step == 0)
                            .unwrap_or(false),
                        _ => true,
                    };
                    let head = with_step(&format!("{}-SAT", day_name(start)), step);
                    return if lands_on_sunday {
                        format!("{},SUN", head)
                    } else {
                        head
                    };
                }
                Some((start, end)) => format!("{}-{}", day_name(start), day_name(end)),
                None => day_name(range).to_string(),
            };

            with_step(&translated, step)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn with_step(range: &str, step: Option<&str>) -> String {
    match step {
        Some(step) => format!("{}/{}", range, step),
        None => range.to_string(),
    }
}

fn day_name(token: &str) -> &str {
    match token.parse::<usize>() {
        Ok(n) if n <= 7 => DAY_NAMES[n % 7],
        _ => token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_parse_valid_expression() {
        let expr = ScheduleExpression::parse("*/5 * * * *").unwrap();
        assert_eq!(expr.as_str(), "*/5 * * * *");
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        let err = ScheduleExpression::parse("0 0 * * * *").unwrap_err();
        assert!(matches!(err, CronError::Configuration(_)));

        let err = ScheduleExpression::parse("some-timestamp").unwrap_err();
        assert!(matches!(err, CronError::Configuration(_)));
    }

    #[test]
    fn test_parse_rejects_bad_field() {
        let err = ScheduleExpression::parse("61 * * * *").unwrap_err();
        assert!(matches!(err, CronError::ParseError(_)));
    }

    #[test]
    fn test_day_of_week_translation() {
        assert_eq!(day_of_week("*"), "*");
        assert_eq!(day_of_week("0"), "SUN");
        assert_eq!(day_of_week("7"), "SUN");
        assert_eq!(day_of_week("1-5"), "MON-FRI");
        assert_eq!(day_of_week("1,3,5"), "MON,WED,FRI");
        assert_eq!(day_of_week("5-7"), "FRI-SAT,SUN");
        assert_eq!(day_of_week("1-7/2"), "MON-SAT/2,SUN");
        assert_eq!(day_of_week("2-7/2"), "TUE-SAT/2");
        assert_eq!(day_of_week("*/2"), "*/2");
        assert_eq!(day_of_week("5/2"), "FRI-SAT/2,SUN");
        assert_eq!(day_of_week("1/2"), "MON-SAT/2,SUN");
        assert_eq!(day_of_week("0/2"), "SUN-SAT/2");
        assert_eq!(day_of_week("7/3"), "SUN");
        assert_eq!(day_of_week("MON-FRI"), "MON-FRI");
    }

    #[test]
    fn test_day_of_week_step_without_range() {
        let expr = ScheduleExpression::parse("0 0 * * 5/2").unwrap();

        // Fridays and Sundays: 2024-06-07 is a Friday.
        let friday = Utc.with_ymd_and_hms(2024, 6, 7, 0, 0, 0).unwrap();
        let saturday = Utc.with_ymd_and_hms(2024, 6, 8, 0, 0, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2024, 6, 9, 0, 0, 0).unwrap();

        assert!(expr.matches(&friday));
        assert!(!expr.matches(&saturday));
        assert!(expr.matches(&sunday));
    }

    #[test]
    fn test_weekly_matches_sunday_midnight_only() {
        let expr = ScheduleExpression::parse("0 0 * * 0").unwrap();

        // 2024-06-02 is a Sunday.
        let sunday = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let monday_noon = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();

        assert!(expr.matches(&sunday));
        assert!(!expr.matches(&monday_noon));
    }

    #[test]
    fn test_matches_any_instant_within_the_minute() {
        let expr = ScheduleExpression::parse("27 17 * * *").unwrap();
        let at = Utc.with_ymd_and_hms(2016, 11, 22, 17, 27, 42).unwrap()
            + chrono::Duration::milliseconds(250);

        assert!(expr.matches(&at));
        assert!(!expr.matches(&(at + chrono::Duration::minutes(1))));
    }

    #[test]
    fn test_step_expression() {
        let every_two = ScheduleExpression::parse("*/2 * * * *").unwrap();
        let odd = Utc.with_ymd_and_hms(2016, 11, 22, 17, 27, 0).unwrap();
        let even = Utc.with_ymd_and_hms(2016, 11, 22, 17, 28, 0).unwrap();

        assert!(!every_two.matches(&odd));
        assert!(every_two.matches(&even));
    }

    #[test]
    fn test_truncate_to_minute() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 59).unwrap()
            + chrono::Duration::nanoseconds(999);
        let truncated = truncate_to_minute(at);

        assert_eq!(truncated, Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap());
    }

    #[test]
    fn test_equality_uses_source() {
        let a = ScheduleExpression::parse("*/1 * * * *").unwrap();
        let b = ScheduleExpression::parse("* * * * *").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, ScheduleExpression::parse(" */1 * * * * ").unwrap());
    }
}
