// Daily schedule evaluation
//
// A six-field cron expression (seconds first) evaluated in an IANA timezone.
// The digest job uses it both to sleep until the next fire time and to decide
// whether today's run window has opened yet.

use crate::config::SchedulerConfig;
use crate::errors::ScheduleError;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

pub const DEFAULT_CRON: &str = "0 0 16 * * *";
pub const DEFAULT_TIMEZONE: &str = "Asia/Jerusalem";

/// Parse and validate a cron expression
pub fn parse_cron_expression(expression: &str) -> Result<CronSchedule, ScheduleError> {
    CronSchedule::from_str(expression).map_err(|e| ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    name.parse::<Tz>()
        .map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
}

#[derive(Debug, Clone)]
pub struct DailySchedule {
    expression: String,
    schedule: CronSchedule,
    timezone: Tz,
}

impl DailySchedule {
    pub fn new(expression: &str, timezone: &str) -> Result<Self, ScheduleError> {
        Ok(Self {
            expression: expression.to_string(),
            schedule: parse_cron_expression(expression)?,
            timezone: parse_timezone(timezone)?,
        })
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self, ScheduleError> {
        Self::new(&config.cron, &config.timezone)
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// `now` expressed in the schedule's timezone
    pub fn local(&self, now: DateTime<Utc>) -> DateTime<Tz> {
        now.with_timezone(&self.timezone)
    }

    /// Local calendar date at `now`
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local(now).date_naive()
    }

    /// Next fire time strictly after `reference`
    pub fn next_after(&self, reference: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        let reference_in_tz = reference.with_timezone(&self.timezone);
        self.schedule
            .after(&reference_in_tz)
            .next()
            .map(|next| next.with_timezone(&Utc))
            .ok_or_else(|| ScheduleError::NoNextExecution {
                schedule_type: "cron".to_string(),
            })
    }

    /// First fire time on a local date, None when the schedule skips that day
    pub fn window_start(&self, date: NaiveDate) -> Option<DateTime<Tz>> {
        let midnight = self
            .timezone
            .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
            .earliest()?;
        let first = self
            .schedule
            .after(&(midnight - Duration::seconds(1)))
            .next()?;
        (first.date_naive() == date).then_some(first)
    }

    /// Whether today's window has opened at `now`
    ///
    /// False on days the schedule does not fire.
    pub fn window_open(&self, now: DateTime<Utc>) -> bool {
        let local = self.local(now);
        self.window_start(local.date_naive())
            .is_some_and(|start| local >= start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn default_schedule() -> DailySchedule {
        DailySchedule::new(DEFAULT_CRON, DEFAULT_TIMEZONE).unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_valid_cron_expression() {
        assert!(parse_cron_expression("0 0 16 * * *").is_ok());
        assert!(parse_cron_expression("0 30 9 * * Mon-Fri").is_ok());
    }

    #[test]
    fn test_parse_invalid_cron_expression() {
        let err = parse_cron_expression("not a cron").unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCronExpression { .. }));
    }

    #[test]
    fn test_invalid_timezone() {
        assert!(matches!(
            DailySchedule::new(DEFAULT_CRON, "Mars/Olympus"),
            Err(ScheduleError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_next_fire_is_four_pm_jerusalem() {
        let schedule = DailySchedule::new(DEFAULT_CRON, DEFAULT_TIMEZONE).unwrap();

        // Winter, UTC+2: 16:00 local is 14:00 UTC
        let next = schedule.next_after(utc("2024-01-15T10:00:00Z")).unwrap();
        assert_eq!(next, utc("2024-01-15T14:00:00Z"));

        // Summer, UTC+3: 16:00 local is 13:00 UTC
        let next = schedule.next_after(utc("2024-07-15T10:00:00Z")).unwrap();
        assert_eq!(next, utc("2024-07-15T13:00:00Z"));
    }

    #[test]
    fn test_next_fire_after_window_is_tomorrow() {
        let schedule = default_schedule();
        let next = schedule.next_after(utc("2024-01-15T14:00:00Z")).unwrap();
        assert_eq!(next, utc("2024-01-16T14:00:00Z"));
        assert_eq!(schedule.local(next).hour(), 16);
    }

    #[test]
    fn test_window_open() {
        let schedule = default_schedule();
        assert!(!schedule.window_open(utc("2024-01-15T13:59:59Z")));
        assert!(schedule.window_open(utc("2024-01-15T14:00:00Z")));
        assert!(schedule.window_open(utc("2024-01-15T21:30:00Z")));
    }

    #[test]
    fn test_local_date_crosses_midnight_before_utc() {
        let schedule = default_schedule();
        // 23:30 UTC is already the next day in Jerusalem
        assert_eq!(
            schedule.local_date(utc("2024-01-15T23:30:00Z")),
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()
        );
    }

    #[test]
    fn test_window_closed_on_skipped_days() {
        let schedule = DailySchedule::new("0 0 16 * * Mon", DEFAULT_TIMEZONE).unwrap();
        // 2024-01-16 is a Tuesday
        assert!(!schedule.window_open(utc("2024-01-16T20:00:00Z")));
        assert!(schedule.window_open(utc("2024-01-15T20:00:00Z")));
    }
}
