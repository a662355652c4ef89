//! Date ranges and the time-zone policy
//!
//! `DateRange` is the inclusive `[start, end]` filter applied before any
//! aggregation. `ZonePolicy` pins calendar dates and hours of day to one
//! explicit UTC offset so results do not depend on the host's local time.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Timelike, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

const MS_PER_HOUR: i64 = 3600 * 1000;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Errors produced while interpreting user-supplied dates
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RangeError {
    #[error("Cannot parse time: {0}")]
    Unparseable(String),

    #[error("Unknown range preset: {0}. Use 24h, 7d, 30d, 90d or all")]
    UnknownPreset(String),

    #[error("UTC offset out of range: {0} minutes")]
    InvalidOffset(i32),

    #[error("start ({start}) must not be after end ({end})")]
    Inverted { start: i64, end: i64 },
}

/// Inclusive time interval in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// Start timestamp (inclusive)
    pub start: i64,
    /// End timestamp (inclusive)
    pub end: i64,
}

impl DateRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: i64, end: i64) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Range covering every representable timestamp
    pub fn unbounded() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
        }
    }

    /// Build from optional bounds; `None` when neither bound is given
    pub fn from_bounds(start: Option<i64>, end: Option<i64>) -> Result<Option<Self>, RangeError> {
        match (start, end) {
            (None, None) => Ok(None),
            (s, e) => Self::new(s.unwrap_or(i64::MIN), e.unwrap_or(i64::MAX)).map(Some),
        }
    }

    /// Range for the last N days ending at `now`
    pub fn last_days(now: i64, days: i64) -> Self {
        Self {
            start: now - days * MS_PER_DAY,
            end: now,
        }
    }

    /// Check if a timestamp falls within this range (both ends inclusive)
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Apply an optional range filter
pub fn in_range(range: Option<&DateRange>, timestamp: i64) -> bool {
    range.map(|r| r.contains(timestamp)).unwrap_or(true)
}

/// Which side of a range a parsed bound belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// Fixed-offset time-zone policy used for calendar dates and hours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonePolicy {
    offset: FixedOffset,
}

impl ZonePolicy {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Offset east of UTC in minutes (e.g. -180 for UTC-3)
    pub fn from_offset_minutes(minutes: i32) -> Result<Self, RangeError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(|offset| Self { offset })
            .ok_or(RangeError::InvalidOffset(minutes))
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    fn local(&self, timestamp: i64) -> Option<DateTime<FixedOffset>> {
        DateTime::from_timestamp_millis(timestamp).map(|dt| dt.with_timezone(&self.offset))
    }

    /// Calendar date (`YYYY-MM-DD`) of a timestamp in this zone
    pub fn date_key(&self, timestamp: i64) -> String {
        self.local(timestamp)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "invalid-date".to_string())
    }

    /// Hour of day (0-23) of a timestamp in this zone
    pub fn hour_of(&self, timestamp: i64) -> u32 {
        self.local(timestamp).map(|dt| dt.hour()).unwrap_or(0)
    }

    /// First millisecond of a calendar date in this zone
    pub fn start_of_day(&self, date: NaiveDate) -> i64 {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        self.offset
            .from_local_datetime(&midnight)
            .single()
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|| midnight.and_utc().timestamp_millis())
    }

    /// Last millisecond of a calendar date in this zone
    pub fn end_of_day(&self, date: NaiveDate) -> i64 {
        self.start_of_day(date) + MS_PER_DAY - 1
    }

    /// Calendar date of a timestamp in this zone
    pub fn date_of(&self, timestamp: i64) -> Option<NaiveDate> {
        self.local(timestamp).map(|dt| dt.date_naive())
    }
}

impl Default for ZonePolicy {
    fn default() -> Self {
        Self::utc()
    }
}

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^now-(\d+)([hdwm])$").expect("valid relative time regex"))
}

/// Parse one range bound.
///
/// Accepts epoch milliseconds, RFC 3339, `YYYY-MM-DD` (start or end of that
/// day depending on `bound`), `now` and `now-<n>{h,d,w,m}`.
pub fn parse_bound(s: &str, bound: Bound, now: i64, zone: ZonePolicy) -> Result<i64, RangeError> {
    let s = s.trim();

    if s == "now" {
        return Ok(now);
    }

    if let Some(caps) = relative_re().captures(s) {
        let amount: i64 = caps[1]
            .parse()
            .map_err(|_| RangeError::Unparseable(s.to_string()))?;
        let unit_ms = match &caps[2] {
            "h" => MS_PER_HOUR,
            "d" => MS_PER_DAY,
            "w" => 7 * MS_PER_DAY,
            "m" => 30 * MS_PER_DAY,
            _ => return Err(RangeError::Unparseable(s.to_string())),
        };
        return amount
            .checked_mul(unit_ms)
            .map(|ms| now - ms)
            .ok_or_else(|| RangeError::Unparseable(s.to_string()));
    }

    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(match bound {
            Bound::Start => zone.start_of_day(date),
            Bound::End => zone.end_of_day(date),
        });
    }

    Err(RangeError::Unparseable(s.to_string()))
}

/// Parse optional `start` / `end` strings into a range filter
pub fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
    now: i64,
    zone: ZonePolicy,
) -> Result<Option<DateRange>, RangeError> {
    let start = start
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_bound(s, Bound::Start, now, zone))
        .transpose()?;
    let end = end
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_bound(s, Bound::End, now, zone))
        .transpose()?;
    DateRange::from_bounds(start, end)
}

/// Expand a dashboard preset into whole days ending today.
///
/// `24h`, `7d`, `30d`, `90d` reach back that far from `now`; `all` starts
/// on 2020-01-01. The start is snapped to the beginning of its day and the
/// end to the end of today.
pub fn preset(name: &str, now: i64, zone: ZonePolicy) -> Result<DateRange, RangeError> {
    let start = match name.trim() {
        "24h" => now - MS_PER_DAY,
        "7d" => now - 7 * MS_PER_DAY,
        "30d" => now - 30 * MS_PER_DAY,
        "90d" => now - 90 * MS_PER_DAY,
        "all" => {
            let epoch = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default();
            zone.start_of_day(epoch)
        }
        other => return Err(RangeError::UnknownPreset(other.to_string())),
    };

    let start_day = zone
        .date_of(start)
        .ok_or_else(|| RangeError::Unparseable(start.to_string()))?;
    let today = zone
        .date_of(now)
        .ok_or_else(|| RangeError::Unparseable(now.to_string()))?;

    DateRange::new(zone.start_of_day(start_day), zone.end_of_day(today))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-10T15:30:00Z
    const NOW: i64 = 1_710_084_600_000;

    #[test]
    fn test_range_contains_is_inclusive() {
        let range = DateRange::new(1000, 2000).unwrap();
        assert!(!range.contains(999));
        assert!(range.contains(1000));
        assert!(range.contains(2000));
        assert!(!range.contains(2001));
        assert!(DateRange::new(2000, 1000).is_err());
    }

    #[test]
    fn test_from_bounds() {
        assert_eq!(DateRange::from_bounds(None, None).unwrap(), None);
        let open_end = DateRange::from_bounds(Some(5), None).unwrap().unwrap();
        assert!(open_end.contains(i64::MAX));
        assert!(!open_end.contains(4));
    }

    #[test]
    fn test_zone_date_and_hour() {
        let utc = ZonePolicy::utc();
        assert_eq!(utc.date_key(NOW), "2024-03-10");
        assert_eq!(utc.hour_of(NOW), 15);

        let brt = ZonePolicy::from_offset_minutes(-180).unwrap();
        assert_eq!(brt.hour_of(NOW), 12);
        // 01:00 UTC is still the previous day at UTC-3
        assert_eq!(brt.date_key(NOW - 14 * MS_PER_HOUR - 30 * 60 * 1000), "2024-03-09");

        assert!(ZonePolicy::from_offset_minutes(24 * 60).is_err());
    }

    #[test]
    fn test_parse_bound_forms() {
        let utc = ZonePolicy::utc();
        assert_eq!(parse_bound("now", Bound::Start, NOW, utc).unwrap(), NOW);
        assert_eq!(
            parse_bound("now-2h", Bound::Start, NOW, utc).unwrap(),
            NOW - 2 * MS_PER_HOUR
        );
        assert_eq!(parse_bound("12345", Bound::Start, NOW, utc).unwrap(), 12345);
        assert_eq!(
            parse_bound("2024-03-10T15:30:00Z", Bound::Start, NOW, utc).unwrap(),
            NOW
        );

        let day_start = parse_bound("2024-03-10", Bound::Start, NOW, utc).unwrap();
        let day_end = parse_bound("2024-03-10", Bound::End, NOW, utc).unwrap();
        assert_eq!(day_end - day_start, MS_PER_DAY - 1);
        assert!(day_start <= NOW && NOW <= day_end);

        assert!(parse_bound("yesterday-ish", Bound::Start, NOW, utc).is_err());
    }

    #[test]
    fn test_parse_range_rejects_inverted() {
        let utc = ZonePolicy::utc();
        assert!(parse_range(Some("2000"), Some("1000"), NOW, utc).is_err());
        assert_eq!(parse_range(Some(""), None, NOW, utc).unwrap(), None);
    }

    #[test]
    fn test_presets_snap_to_whole_days() {
        let utc = ZonePolicy::utc();
        let week = preset("7d", NOW, utc).unwrap();
        assert_eq!(utc.date_key(week.start), "2024-03-03");
        assert_eq!(utc.hour_of(week.start), 0);
        assert_eq!(utc.date_key(week.end), "2024-03-10");
        assert_eq!(utc.hour_of(week.end), 23);

        let all = preset("all", NOW, utc).unwrap();
        assert_eq!(utc.date_key(all.start), "2020-01-01");

        assert!(matches!(
            preset("1y", NOW, utc),
            Err(RangeError::UnknownPreset(_))
        ));
    }
}
