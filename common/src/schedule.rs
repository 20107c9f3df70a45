// Schedule parsing and next execution time calculation
//
// The two supported frequencies are translated into cron expressions
// (second precision) and evaluated in the server's local timezone.

use crate::errors::ScheduleError;
use chrono::{DateTime, Local, NaiveTime, TimeZone, Timelike};
use cron::Schedule as CronSchedule;
use std::fmt;
use std::str::FromStr;

/// How often the dispatch job fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Once a day at HH:MM
    Daily,
    /// Once an hour at minute MM of the configured time
    Hourly,
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "hourly" => Ok(Frequency::Hourly),
            other => Err(ScheduleError::UnsupportedFrequency(other.to_string())),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => f.write_str("daily"),
            Frequency::Hourly => f.write_str("hourly"),
        }
    }
}

/// Parse an `HH:MM` time of day
pub fn parse_time_of_day(time: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| ScheduleError::InvalidTime(time.to_string()))
}

/// Build the cron expression for a frequency and time of day
pub fn cron_expression(frequency: Frequency, at: NaiveTime) -> String {
    match frequency {
        Frequency::Daily => format!("0 {} {} * * *", at.minute(), at.hour()),
        Frequency::Hourly => format!("0 {} * * * *", at.minute()),
    }
}

/// Parse and validate a cron expression
pub fn parse_cron_expression(expression: &str) -> Result<CronSchedule, ScheduleError> {
    CronSchedule::from_str(expression).map_err(|e| ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// A parsed trigger that can compute its next firing time
#[derive(Debug, Clone)]
pub struct Trigger {
    frequency: Frequency,
    at: NaiveTime,
    schedule: CronSchedule,
}

impl Trigger {
    pub fn new(frequency: Frequency, time: &str) -> Result<Self, ScheduleError> {
        let at = parse_time_of_day(time)?;
        let schedule = parse_cron_expression(&cron_expression(frequency, at))?;
        Ok(Self {
            frequency,
            at,
            schedule,
        })
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.at
    }

    /// First firing strictly after `after`
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Result<DateTime<Tz>, ScheduleError> {
        self.schedule
            .after(after)
            .next()
            .ok_or_else(|| ScheduleError::NoNextExecution {
                frequency: self.frequency.to_string(),
            })
    }

    /// Next firing after the current local time
    pub fn next_from_now(&self) -> Result<DateTime<Local>, ScheduleError> {
        self.next_after(&Local::now())
    }
}
