//! Calendar values produced by the temporal parser.
//!
//! These are plain field records. They are converted to `chrono` types on
//! demand; out-of-range fields (the parser is lenient) yield `None`.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

const SECONDS_PER_DAY: i64 = 86_400;

/// A calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Date {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl Date {
    pub const fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Convert to a chrono date, if the fields form a valid date.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// A UTC offset expressed as a reduced fraction of one day.
///
/// `+05:30` is 19800 s / 86400 s, which reduces to 11/48.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DayFraction {
    pub numerator: i64,
    pub denominator: i64,
}

impl DayFraction {
    /// The zero offset (0/1).
    pub const UTC: DayFraction = DayFraction {
        numerator: 0,
        denominator: 1,
    };

    /// Reduce `seconds / 86400` by the greatest common divisor.
    pub fn from_seconds(seconds: i64) -> Self {
        let divisor = gcd(seconds.abs(), SECONDS_PER_DAY);
        Self {
            numerator: seconds / divisor,
            denominator: SECONDS_PER_DAY / divisor,
        }
    }

    /// Build an offset from signed hour and minute components.
    ///
    /// The minute component takes the sign of the hour component, so
    /// `(-3, 30)` is minus three and a half hours.
    pub fn from_hours_minutes(hours: i64, minutes: i64) -> Self {
        let minutes = if hours < 0 { -minutes.abs() } else { minutes };
        Self::from_seconds(hours * 3600 + minutes * 60)
    }

    /// The offset in seconds east of UTC.
    pub fn seconds(&self) -> i64 {
        self.numerator * (SECONDS_PER_DAY / self.denominator)
    }

    /// Convert to a chrono fixed offset.
    pub fn to_fixed_offset(&self) -> Option<FixedOffset> {
        i32::try_from(self.seconds())
            .ok()
            .and_then(FixedOffset::east_opt)
    }
}

impl Default for DayFraction {
    fn default() -> Self {
        Self::UTC
    }
}

impl fmt::Display for DayFraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.seconds();
        let sign = if total < 0 { '-' } else { '+' };
        let total = total.abs();
        write!(f, "{}{:02}:{:02}", sign, total / 3600, (total % 3600) / 60)
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    if a == 0 { 1 } else { a }
}

/// A zoned timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Timestamp {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
    pub offset: DayFraction,
}

impl Timestamp {
    /// The date part.
    pub fn date(&self) -> Date {
        Date::new(self.year, self.month, self.day)
    }

    /// Wall-clock value without the offset.
    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        let date = self.date().to_naive_date()?;
        let time = NaiveTime::from_hms_micro_opt(self.hour, self.minute, self.second, self.microsecond)?;
        Some(NaiveDateTime::new(date, time))
    }

    /// Zone-aware value.
    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let offset = self.offset.to_fixed_offset()?;
        self.to_naive_datetime()?
            .and_local_timezone(offset)
            .single()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}:{:02}",
            self.date(),
            self.hour,
            self.minute,
            self.second
        )?;
        if self.microsecond != 0 {
            write!(f, ".{:06}", self.microsecond)?;
        }
        write!(f, "{}", self.offset)
    }
}

/// A local wall-clock time with its date context and no offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeOfDay {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
}

impl TimeOfDay {
    pub fn to_naive_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_micro_opt(self.hour, self.minute, self.second, self.microsecond)
    }

    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day)?;
        Some(NaiveDateTime::new(date, self.to_naive_time()?))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        if self.microsecond != 0 {
            write!(f, ".{:06}", self.microsecond)?;
        }
        Ok(())
    }
}
