// models/src/timestamps.rs
//! Parsing helpers for form timestamps and clinic time zones.

use chrono::{DateTime, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

use crate::errors::{ValidationError, ValidationResult};

/// A zone the clinic reads local times in: a fixed UTC offset, an IANA zone
/// such as `America/New_York` (daylight saving aware), or the host's zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Fixed(FixedOffset),
    Named(Tz),
    Local,
}

impl Zone {
    pub fn utc() -> Self {
        Zone::Named(Tz::UTC)
    }

    /// Accepts `local`, anything [`parse_offset`] accepts, or an IANA name.
    pub fn parse(raw: &str) -> Option<Zone> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("local") {
            return Some(Zone::Local);
        }
        if let Some(offset) = parse_offset(raw) {
            return Some(Zone::Fixed(offset));
        }
        raw.parse::<Tz>().ok().map(Zone::Named)
    }

    fn from_local(&self, naive: &NaiveDateTime) -> LocalResult<DateTime<Utc>> {
        match self {
            Zone::Fixed(tz) => tz.from_local_datetime(naive).map(|dt| dt.with_timezone(&Utc)),
            Zone::Named(tz) => tz.from_local_datetime(naive).map(|dt| dt.with_timezone(&Utc)),
            Zone::Local => Local.from_local_datetime(naive).map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// The calendar date `at` falls on in this zone.
    pub fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            Zone::Fixed(tz) => at.with_timezone(tz).date_naive(),
            Zone::Named(tz) => at.with_timezone(tz).date_naive(),
            Zone::Local => at.with_timezone(&Local).date_naive(),
        }
    }

    pub fn format(&self, at: DateTime<Utc>, pattern: &str) -> String {
        match self {
            Zone::Fixed(tz) => at.with_timezone(tz).format(pattern).to_string(),
            Zone::Named(tz) => at.with_timezone(tz).format(pattern).to_string(),
            Zone::Local => at.with_timezone(&Local).format(pattern).to_string(),
        }
    }

    /// First instant of `date` in this zone. Zones that skip midnight start
    /// the day at the end of the gap.
    fn start_of(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        (0..=2)
            .map(|hours| midnight + Duration::hours(hours))
            .find_map(|candidate| self.from_local(&candidate).earliest())
    }
}

impl Default for Zone {
    fn default() -> Self {
        Zone::utc()
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Fixed(offset) => write!(f, "{}", offset),
            Zone::Named(tz) => write!(f, "{}", tz.name()),
            Zone::Local => write!(f, "local"),
        }
    }
}

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Parses an RFC 3339 timestamp, or a `datetime-local` style value which is
/// then read in `zone`.
pub fn parse_timestamp(field: &'static str, raw: &str, zone: Zone) -> ValidationResult<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return zone
                .from_local(&naive)
                .single()
                .ok_or_else(|| ValidationError::invalid(field, format!("'{}' is ambiguous or skipped in {}", raw, zone)));
        }
    }
    Err(ValidationError::invalid(field, format!("'{}' is not a recognised date and time", raw)))
}

/// Parses `Z`, `UTC`, `+05:30`, `-0400` or `+02`.
pub fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Start (inclusive) and end (exclusive) of the calendar day containing
/// `now` in `zone`, expressed in UTC. Daylight saving days are 23 or 25
/// hours long.
pub fn local_day_bounds(now: DateTime<Utc>, zone: Zone) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = zone.date_of(now);
    let start = zone.start_of(today).unwrap_or(now);
    let end = today
        .succ_opt()
        .and_then(|tomorrow| zone.start_of(tomorrow))
        .unwrap_or(start + Duration::days(1));
    (start, end)
}
