//! Wall-clock values for `[clock_<field>]` variables

use chrono::{Datelike, NaiveDateTime, Timelike};
use hasi_core::ParseError;
use std::fmt;
use std::str::FromStr;

use crate::clock::SharedClock;

/// A calendar component of the local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarField {
    Hour,
    Minute,
    Second,
    Day,
    Month,
    Year,
    /// Minutes since midnight
    MinuteOfDay,
    /// 0 = Monday
    DayOfWeek,
    /// 1-based
    DayOfYear,
    /// 1-based, weeks starting on Monday
    WeekOfYear,
}

impl CalendarField {
    /// Extract this field from a local timestamp
    pub fn of(self, t: &NaiveDateTime) -> f64 {
        let dow = t.weekday().num_days_from_monday();
        let value = match self {
            Self::Hour => t.hour(),
            Self::Minute => t.minute(),
            Self::Second => t.second(),
            Self::Day => t.day(),
            Self::Month => t.month(),
            Self::Year => return f64::from(t.year()),
            Self::MinuteOfDay => t.hour() * 60 + t.minute(),
            Self::DayOfWeek => dow,
            Self::DayOfYear => t.ordinal(),
            Self::WeekOfYear => 1 + (t.ordinal0() + 6 - dow) / 7,
        };
        f64::from(value)
    }
}

impl FromStr for CalendarField {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hour" => Ok(Self::Hour),
            "min" => Ok(Self::Minute),
            "sec" => Ok(Self::Second),
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "mod" => Ok(Self::MinuteOfDay),
            "dow" => Ok(Self::DayOfWeek),
            "doy" => Ok(Self::DayOfYear),
            "woy" => Ok(Self::WeekOfYear),
            _ => Err(ParseError::InvalidClockVariable {
                name: s.to_string(),
            }),
        }
    }
}

/// Answers `[clock_*]` reads from the shared clock
#[derive(Debug)]
pub struct ClockManager {
    clock: SharedClock,
}

impl ClockManager {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// Reject unknown field names at layout time
    pub fn validate(name: &str) -> Result<CalendarField, ParseError> {
        name.parse()
    }

    /// Value of `[clock_<name>]`; unknown names read as 0
    pub fn get_clock(&self, name: &str) -> f64 {
        name.parse::<CalendarField>()
            .map(|field| field.of(&self.clock.local_now()))
            .unwrap_or(0.0)
    }
}

impl fmt::Display for ClockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.clock.local_now();
        writeln!(
            f,
            "{}  Day of week (starting monday): {}, Day of year: {}, Week of year: {}",
            t.format("%H:%M:%S  %d.%m.%Y"),
            CalendarField::DayOfWeek.of(&t),
            CalendarField::DayOfYear.of(&t),
            CalendarField::WeekOfYear.of(&t)
        )
    }
}
