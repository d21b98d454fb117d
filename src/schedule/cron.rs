//! Cron expression parsing and next-occurrence computation under an
//! arbitrary IANA timezone (spec §3 `Schedule.timezone`, §4.2 step 2-3).
//!
//! The reference monorepo schedules its handful of fixed, compile-time jobs
//! with `tokio_cron_scheduler` (see `kernel/scheduled_tasks.rs`), which has
//! no notion of a per-row timezone and isn't meant to parse an arbitrary
//! number of DB-stored expressions. This crate instead uses the `cron` crate
//! for expression parsing/next-occurrence math plus `chrono-tz` for
//! timezone-aware evaluation, confirmed as real dependencies elsewhere in
//! the retrieval pack's `other_examples/manifests/`. See `DESIGN.md`.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum CronError {
    #[error("invalid cron expression: {0}")]
    InvalidExpression(String),
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("cron expression has no future occurrences")]
    NoOccurrence,
}

/// Validates that `expression` parses under `timezone` (spec §3 invariant:
/// "`cronExpression` must parse under `timezone`").
pub fn validate(expression: &str, timezone: &str) -> Result<(), CronError> {
    parse_timezone(timezone)?;
    CronSchedule::from_str(expression)
        .map(|_| ())
        .map_err(|e| CronError::InvalidExpression(e.to_string()))
}

/// Computes the next occurrence strictly after `after`, in UTC (spec §4.2
/// step 3: `newNextRunAt = nextOccurrence(cron, tz, after=now)`).
pub fn next_occurrence(
    expression: &str,
    timezone: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, CronError> {
    let tz = parse_timezone(timezone)?;
    let schedule = CronSchedule::from_str(expression)
        .map_err(|e| CronError::InvalidExpression(e.to_string()))?;
    let after_in_tz = after.with_timezone(&tz);
    let next = schedule
        .after(&after_in_tz)
        .next()
        .ok_or(CronError::NoOccurrence)?;
    Ok(next.with_timezone(&Utc))
}

fn parse_timezone(timezone: &str) -> Result<Tz, CronError> {
    Tz::from_str(timezone).map_err(|_| CronError::UnknownTimezone(timezone.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn validate_accepts_standard_six_field_expression() {
        assert!(validate("0 0 9 * * *", "Asia/Shanghai").is_ok());
    }

    #[test]
    fn validate_rejects_garbage_expression() {
        assert!(validate("bad cron", "Asia/Shanghai").is_err());
    }

    #[test]
    fn validate_rejects_unknown_timezone() {
        assert!(validate("0 0 9 * * *", "Not/ARealZone").is_err());
    }

    #[test]
    fn next_occurrence_advances_strictly_after_given_instant() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = next_occurrence("0 0 9 * * *", "UTC", after).unwrap();
        assert!(next > after);
        assert_eq!(next.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn next_occurrence_respects_timezone_offset() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let shanghai_next = next_occurrence("0 0 9 * * *", "Asia/Shanghai", after).unwrap();
        // 09:00 Shanghai (UTC+8) is 01:00 UTC.
        assert_eq!(shanghai_next.format("%H:%M").to_string(), "01:00");
    }
}
