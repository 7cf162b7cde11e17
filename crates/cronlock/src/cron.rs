use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use cron::Schedule;

use crate::error::{Result, SchedulerError};

/// Cron-expression evaluation as the scheduler consumes it: validity plus
/// previous-tick lookups. The election protocol only ever looks backward,
/// asking "what was the most recent scheduled moment?".
///
/// Injected into the scheduler so tests can pin tick values per scenario.
pub trait CronParser: Send + Sync + 'static {
    /// Whether `expr` is an acceptable five-field cron expression.
    fn is_valid(&self, expr: &str) -> bool;

    /// The most recent tick of `expr` relative to the current wall clock.
    /// With `inclusive` a tick landing exactly on the reference instant
    /// counts; otherwise the tick must lie strictly before it.
    fn prev_tick(&self, expr: &str, inclusive: bool) -> Result<DateTime<Utc>>;

    /// The most recent tick of `expr` at or before `at` (strictly before
    /// when `inclusive` is false).
    fn prev_tick_before(&self, expr: &str, at: DateTime<Utc>, inclusive: bool)
        -> Result<DateTime<Utc>>;
}

/// Five-field standard cron (minute, hour, day-of-month, month, day-of-week),
/// evaluated in UTC at whole-minute resolution.
pub struct StandardCron;

/// Progressively widened search windows for the previous tick. Most
/// expressions match within the hour; the final window covers a full
/// leap-year cycle for dates like Feb 29.
const LOOKBACK_DAYS: [i64; 5] = [1, 7, 32, 366, 4 * 366 + 1];

impl StandardCron {
    fn parse(&self, expr: &str) -> Result<Schedule> {
        if expr.split_whitespace().count() != 5 {
            return Err(SchedulerError::BadCron(expr.to_string()));
        }
        // The underlying parser wants a seconds column; pin it to zero so
        // every occurrence lands on a whole minute.
        Schedule::from_str(&format!("0 {expr}"))
            .map_err(|e| SchedulerError::BadCron(format!("{expr}: {e}")))
    }
}

impl CronParser for StandardCron {
    fn is_valid(&self, expr: &str) -> bool {
        self.parse(expr).is_ok()
    }

    fn prev_tick(&self, expr: &str, inclusive: bool) -> Result<DateTime<Utc>> {
        self.prev_tick_before(expr, Utc::now(), inclusive)
    }

    fn prev_tick_before(
        &self,
        expr: &str,
        at: DateTime<Utc>,
        inclusive: bool,
    ) -> Result<DateTime<Utc>> {
        let schedule = self.parse(expr)?;

        // Ticks have whole-minute resolution, so the latest candidate is
        // `at` truncated down to its minute.
        let mut limit = at
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(at);
        if !inclusive && limit >= at {
            limit = limit - chrono::Duration::minutes(1);
        }

        for days in LOOKBACK_DAYS {
            let start = limit - chrono::Duration::days(days);
            if let Some(tick) = schedule.after(&start).take_while(|t| *t <= limit).last() {
                return Ok(tick);
            }
        }
        Err(SchedulerError::BadCron(format!(
            "{expr}: no occurrence in the preceding {} days",
            LOOKBACK_DAYS[LOOKBACK_DAYS.len() - 1],
        )))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn accepts_standard_expressions() {
        let cron = StandardCron;
        assert!(cron.is_valid("* * * * *"));
        assert!(cron.is_valid("*/5 0 * 8 *"));
        assert!(cron.is_valid("15 14 1 * *"));
        assert!(cron.is_valid("0 22 * * 1-5"));
    }

    #[test]
    fn rejects_malformed_expressions() {
        let cron = StandardCron;
        assert!(!cron.is_valid("bad cron"));
        assert!(!cron.is_valid(""));
        assert!(!cron.is_valid("* * * *"));
        assert!(!cron.is_valid("* * * * * *"));
        assert!(!cron.is_valid("61 * * * *"));
    }

    #[test]
    fn previous_tick_every_minute() {
        let cron = StandardCron;
        let at = utc(2024, 5, 14, 10, 30, 42);
        let tick = cron.prev_tick_before("* * * * *", at, true).unwrap();
        assert_eq!(tick, utc(2024, 5, 14, 10, 30, 0));
    }

    #[test]
    fn inclusive_bound_keeps_exact_minute() {
        let cron = StandardCron;
        let at = utc(2024, 5, 14, 10, 30, 0);
        let tick = cron.prev_tick_before("* * * * *", at, true).unwrap();
        assert_eq!(tick, at);
    }

    #[test]
    fn exclusive_bound_steps_back_one_minute() {
        let cron = StandardCron;
        let at = utc(2024, 5, 14, 10, 30, 0);
        let tick = cron.prev_tick_before("* * * * *", at, false).unwrap();
        assert_eq!(tick, utc(2024, 5, 14, 10, 29, 0));
    }

    #[test]
    fn previous_tick_hourly() {
        let cron = StandardCron;
        let at = utc(2024, 5, 14, 10, 30, 0);
        let tick = cron.prev_tick_before("0 * * * *", at, true).unwrap();
        assert_eq!(tick, utc(2024, 5, 14, 10, 0, 0));
    }

    #[test]
    fn previous_tick_crosses_midnight() {
        let cron = StandardCron;
        let at = utc(2024, 5, 14, 0, 10, 0);
        let tick = cron.prev_tick_before("30 22 * * *", at, true).unwrap();
        assert_eq!(tick, utc(2024, 5, 13, 22, 30, 0));
    }

    #[test]
    fn previous_tick_monthly_reaches_back_weeks() {
        let cron = StandardCron;
        let at = utc(2024, 5, 14, 9, 0, 0);
        let tick = cron.prev_tick_before("15 14 1 * *", at, true).unwrap();
        assert_eq!(tick, utc(2024, 5, 1, 14, 15, 0));
    }

    #[test]
    fn previous_tick_leap_day_reaches_back_years() {
        let cron = StandardCron;
        let at = utc(2027, 1, 1, 0, 0, 0);
        let tick = cron.prev_tick_before("0 0 29 2 *", at, true).unwrap();
        assert_eq!(tick, utc(2024, 2, 29, 0, 0, 0));
    }
}
