use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Year,
    Quarter,
    Month,
    Week,
    Day,
}

impl Granularity {
    pub fn all() -> [Self; 5] {
        [Self::Year, Self::Quarter, Self::Month, Self::Week, Self::Day]
    }

    pub fn as_key(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::all().into_iter().find(|g| g.as_key() == key)
    }
}

pub fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date (expected YYYY-MM-DD): {raw}"))
}

pub fn parse_time(raw: &str) -> anyhow::Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| anyhow!("invalid time (expected HH:MM[:SS]): {raw}"))
}

const MAX_OFFSET_MINUTES: i64 = 24 * 60;

/// Offset in minutes as reported by a browser clock: positive west of UTC.
pub fn parse_offset_minutes(raw: Option<&str>) -> anyhow::Result<i64> {
    let minutes = match raw.map(str::trim) {
        None | Some("") => return Ok(0),
        Some(value) => value
            .parse::<i64>()
            .with_context(|| format!("invalid timezone offset: {value}"))?,
    };
    if minutes.abs() > MAX_OFFSET_MINUTES {
        return Err(anyhow!(
            "timezone offset out of range: {minutes} (max ±{MAX_OFFSET_MINUTES} minutes)"
        ));
    }
    Ok(minutes)
}

// utc = local + offset
pub fn local_to_utc(
    date: NaiveDate,
    time: NaiveTime,
    offset_minutes: i64,
) -> anyhow::Result<DateTime<Utc>> {
    let local = NaiveDateTime::new(date, time);
    TimeDelta::try_minutes(offset_minutes)
        .and_then(|delta| local.checked_add_signed(delta))
        .map(|ts| ts.and_utc())
        .ok_or_else(|| anyhow!("date {local} shifted by {offset_minutes} minutes is out of range"))
}

pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%z").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn granularity_keys_roundtrip() {
        for g in Granularity::all() {
            assert_eq!(Granularity::from_key(g.as_key()), Some(g));
        }
        assert_eq!(Granularity::from_key("decade"), None);
    }

    #[test]
    fn local_time_shifts_by_offset() {
        let date = parse_date("2020-01-01").unwrap();
        let time = parse_time("00:00").unwrap();
        let utc = local_to_utc(date, time, -120).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2019, 12, 31, 22, 0, 0).unwrap());
        assert_eq!(format_utc(utc), "2019-12-31T22:00:00+0000");
    }

    #[test]
    fn offset_defaults_to_zero() {
        assert_eq!(parse_offset_minutes(None).unwrap(), 0);
        assert_eq!(parse_offset_minutes(Some(" 60 ")).unwrap(), 60);
        assert!(parse_offset_minutes(Some("east")).is_err());
        assert_eq!(parse_offset_minutes(Some("-1440")).unwrap(), -1440);
        assert!(parse_offset_minutes(Some("1441")).is_err());
        assert!(parse_offset_minutes(Some("1000000000000")).is_err());
        assert!(parse_date("01/02/2020").is_err());
    }

    #[test]
    fn shift_past_calendar_end_is_an_error() {
        let date = NaiveDate::MAX;
        let time = parse_time("23:59:59").unwrap();
        assert!(local_to_utc(date, time, 60).is_err());
        assert!(local_to_utc(date, time, -60).is_ok());
    }
}
