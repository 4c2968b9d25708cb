//! Date, timestamp and time-of-day text parsing.
//!
//! PostgreSQL renders temporal values in ISO style (`2024-03-01 10:15:30.25+05:30`).
//! The parser walks the text like a sequence of fixed-width numeric
//! conversions and counts how many tokens matched; the count decides which
//! fields are present and where the UTC offset comes from.

use chrono::{Local, Offset};
use dataobjects_core::{Date, DayFraction, Error, Result, TimeOfDay, Timestamp, TypeTag};

/// Host's current UTC offset in seconds east of UTC, DST included.
///
/// Used for timestamps that carry a date (and possibly part of a time) but no
/// zone. This is the offset in effect now, not at the parsed instant, so a
/// date on the other side of a DST change gets the wrong hour. Callers that
/// care should store `timestamptz`.
pub fn host_utc_offset_seconds() -> i64 {
    i64::from(Local::now().offset().fix().local_minus_utc())
}

/// Parse `YYYY-MM-DD`. Fields that do not scan are left as zero.
pub fn parse_date(text: &str) -> Date {
    let mut s = Scanner::new(text);
    let mut date = Date::new(0, 0, 0);
    let Some(year) = s.int(4) else {
        return date;
    };
    date.year = i32::try_from(year).unwrap_or(0);
    if !s.literal(b'-') {
        return date;
    }
    let Some(month) = s.int(2) else {
        return date;
    };
    date.month = unsigned(month);
    if !s.literal(b'-') {
        return date;
    }
    if let Some(day) = s.int(2) {
        date.day = unsigned(day);
    }
    date
}

/// Parse a timestamp, inferring the offset when the text has none.
///
/// - date, time and `±HH:MM`: the hour's sign applies to the minutes
/// - date, time and `±HH`: whole-hour offset
/// - date and time, no zone: UTC
/// - date alone, or date with a partial time: missing fields are zero and
///   the offset is the host's current offset
pub fn parse_timestamp(text: &str) -> Result<Timestamp> {
    let scan = scan_date_time(text, true);
    let base = if scan.has_fraction { 7 } else { 6 };

    let offset = if scan.tokens == base + 2 {
        DayFraction::from_seconds(scan.zone_seconds(scan.zone_minute))
    } else if scan.tokens == base + 1 {
        DayFraction::from_seconds(scan.zone_seconds(0))
    } else if scan.tokens == base {
        DayFraction::UTC
    } else if scan.tokens >= 3 {
        let secs = host_utc_offset_seconds();
        DayFraction::from_seconds(secs - secs % 60)
    } else {
        return Err(Error::decode(
            "could not parse date",
            text,
            Some(TypeTag::Timestamp),
        ));
    };

    Ok(Timestamp {
        year: scan.year,
        month: scan.month,
        day: scan.day,
        hour: scan.hour,
        minute: scan.minute,
        second: scan.second,
        microsecond: scan.microsecond,
        offset,
    })
}

/// Parse a local wall-clock value; no offset is read or inferred.
///
/// A fractional part is right-padded to microseconds, so `.01` is 10 000 µs.
pub fn parse_time_of_day(text: &str) -> Result<TimeOfDay> {
    let scan = scan_date_time(text, false);
    if scan.tokens < 3 {
        return Err(Error::decode(
            "could not parse time",
            text,
            Some(TypeTag::Time),
        ));
    }
    Ok(TimeOfDay {
        year: scan.year,
        month: scan.month,
        day: scan.day,
        hour: scan.hour,
        minute: scan.minute,
        second: scan.second,
        microsecond: scan.microsecond,
    })
}

#[derive(Debug, Default)]
struct DateTimeScan {
    tokens: usize,
    has_fraction: bool,
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    microsecond: u32,
    zone_hour: i64,
    zone_negative: bool,
    zone_minute: i64,
}

impl DateTimeScan {
    /// The hour's sign governs the minutes; `-00:30` is negative even though
    /// the hour scans as zero.
    fn zone_seconds(&self, minutes: i64) -> i64 {
        let magnitude = self.zone_hour.abs() * 3600 + minutes * 60;
        if self.zone_negative { -magnitude } else { magnitude }
    }
}

/// `%4d-%2d-%2d %2d:%2d:%2d[.frac][%3d:%2d]`, stopping at the first miss.
fn scan_date_time(text: &str, with_zone: bool) -> DateTimeScan {
    let mut out = DateTimeScan {
        has_fraction: text.contains('.'),
        ..Default::default()
    };
    let mut s = Scanner::new(text);

    macro_rules! field {
        ($width:expr) => {
            match s.int($width) {
                Some(v) => {
                    out.tokens += 1;
                    v
                }
                None => return out,
            }
        };
    }
    macro_rules! lit {
        ($c:expr) => {
            if !s.literal($c) {
                return out;
            }
        };
    }

    out.year = i32::try_from(field!(4)).unwrap_or(0);
    lit!(b'-');
    out.month = unsigned(field!(2));
    lit!(b'-');
    out.day = unsigned(field!(2));
    s.whitespace();
    out.hour = unsigned(field!(2));
    lit!(b':');
    out.minute = unsigned(field!(2));
    lit!(b':');
    out.second = unsigned(field!(2));

    if out.has_fraction {
        lit!(b'.');
        match s.digits() {
            Some(frac) => {
                out.microsecond = fraction_to_micros(frac);
                out.tokens += 1;
            }
            None => return out,
        }
    }

    if with_zone {
        out.zone_negative = s.peek_sign() == Some(b'-');
        out.zone_hour = field!(3);
        lit!(b':');
        out.zone_minute = field!(2);
    }

    out
}

/// Negative fields (`2024--3`) become zero.
fn unsigned(v: i64) -> u32 {
    u32::try_from(v).unwrap_or(0)
}

/// Right-pad (or truncate) fractional digits to six places.
fn fraction_to_micros(digits: &str) -> u32 {
    digits
        .bytes()
        .chain(std::iter::repeat(b'0'))
        .take(6)
        .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
}

/// Minimal `sscanf`-style cursor over ASCII text.
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn literal(&mut self, c: u8) -> bool {
        if self.bytes.get(self.pos) == Some(&c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_sign(&self) -> Option<u8> {
        let mut i = self.pos;
        while i < self.bytes.len() && self.bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        self.bytes.get(i).copied().filter(|b| *b == b'+' || *b == b'-')
    }

    /// `%Nd`: skip whitespace, optional sign, at most `width` chars including
    /// the sign. Fails when no digit is consumed.
    fn int(&mut self, width: usize) -> Option<i64> {
        self.whitespace();
        let start = self.pos;
        let mut i = self.pos;
        let mut negative = false;
        if let Some(&b) = self.bytes.get(i) {
            if b == b'+' || b == b'-' {
                negative = b == b'-';
                i += 1;
            }
        }
        let mut value: i64 = 0;
        let mut seen = false;
        while i < self.bytes.len() && i - start < width && self.bytes[i].is_ascii_digit() {
            value = value * 10 + i64::from(self.bytes[i] - b'0');
            seen = true;
            i += 1;
        }
        if !seen {
            return None;
        }
        self.pos = i;
        Some(if negative { -value } else { value })
    }

    /// Unbounded run of digits.
    fn digits(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos]).ok()
    }
}
