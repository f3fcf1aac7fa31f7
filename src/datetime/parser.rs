//! Datetime parser implementation

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// Integer epoch seconds
const EPOCH_SECONDS: &str = "%s";
/// Float epoch seconds with sub-second precision
const EPOCH_SECONDS_FLOAT: &str = "%s_as_float";
/// Integer epoch milliseconds
const EPOCH_MILLIS: &str = "%ms";

/// Parse a datetime string using the given format
///
/// Values without an offset are interpreted as UTC. Pure dates are placed at
/// midnight UTC.
pub fn parse(value: &str, fmt: &str) -> Result<DateTime<FixedOffset>> {
    let value = value.trim();
    let err = || Error::datetime(value, fmt);

    match fmt {
        EPOCH_SECONDS => {
            let secs: i64 = value.parse().map_err(|_| err())?;
            DateTime::<Utc>::from_timestamp(secs, 0)
                .map(|dt| dt.fixed_offset())
                .ok_or_else(err)
        }
        EPOCH_SECONDS_FLOAT => {
            let f: f64 = value.parse().map_err(|_| err())?;
            if !f.is_finite() {
                return Err(err());
            }
            let secs = f.floor();
            let nanos = (((f - secs) * 1e9).round() as u32).min(999_999_999);
            DateTime::<Utc>::from_timestamp(secs as i64, nanos)
                .map(|dt| dt.fixed_offset())
                .ok_or_else(err)
        }
        EPOCH_MILLIS => {
            let ms: i64 = value.parse().map_err(|_| err())?;
            DateTime::<Utc>::from_timestamp_millis(ms)
                .map(|dt| dt.fixed_offset())
                .ok_or_else(err)
        }
        _ => {
            if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
                return Ok(dt);
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(value, fmt) {
                return Ok(ndt.and_utc().fixed_offset());
            }
            if let Ok(nd) = NaiveDate::parse_from_str(value, fmt) {
                return nd
                    .and_hms_opt(0, 0, 0)
                    .map(|ndt| ndt.and_utc().fixed_offset())
                    .ok_or_else(err);
            }
            Err(err())
        }
    }
}

/// Format a datetime using the given format
pub fn format(dt: &DateTime<FixedOffset>, fmt: &str) -> String {
    match fmt {
        EPOCH_SECONDS => dt.timestamp().to_string(),
        EPOCH_SECONDS_FLOAT => {
            let f = dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9;
            // Debug keeps a trailing ".0" on whole numbers
            format!("{f:?}")
        }
        EPOCH_MILLIS => dt.timestamp_millis().to_string(),
        _ => dt.format(fmt).to_string(),
    }
}

/// Parse a datetime without knowing its format
///
/// Tries RFC 3339 first, then a handful of common layouts.
pub fn parse_flexible(value: &str) -> Result<DateTime<FixedOffset>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }

    let formats = [
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d",
        "%Y/%m/%d",
    ];

    for fmt in formats {
        if let Ok(dt) = parse(value, fmt) {
            return Ok(dt);
        }
    }

    Err(Error::config(format!("Invalid datetime format: {value}")))
}

/// Current time in UTC
pub fn now_utc() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

/// Smallest datetime used as the "no state" lower bound (0001-01-01T00:00:00Z)
pub fn min_datetime() -> DateTime<FixedOffset> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(DateTime::<Utc>::MIN_UTC, |ndt| ndt.and_utc())
        .fixed_offset()
}

/// Parse a duration string
///
/// Accepts ISO 8601 durations (`P1D`, `PT1H`, `P1W`, `P1DT12H`) and short
/// forms (`1d`, `2h`, `30m`, `1w`, `10s`). A bare number means days.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if let Some(iso) = s.strip_prefix('P') {
        return parse_iso_duration(iso, s);
    }

    let (num_str, suffix) = if let Some(stripped) = s.strip_suffix('d') {
        (stripped, 'd')
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 'h')
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 'm')
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 's')
    } else if let Some(stripped) = s.strip_suffix('w') {
        (stripped, 'w')
    } else {
        (s, 'd')
    };

    let num: i64 = num_str
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("Invalid duration number: {num_str}")))?;

    Ok(unit_duration(num, suffix))
}

fn parse_iso_duration(body: &str, original: &str) -> Result<Duration> {
    let invalid = || Error::config(format!("Invalid ISO 8601 duration: {original}"));

    if body.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::zero();
    let mut in_time = false;
    let mut digits = String::new();

    for c in body.chars() {
        match c {
            'T' => {
                if in_time || !digits.is_empty() {
                    return Err(invalid());
                }
                in_time = true;
            }
            '0'..='9' => digits.push(c),
            unit => {
                let num: i64 = digits.parse().map_err(|_| invalid())?;
                digits.clear();
                let part = match (in_time, unit) {
                    (false, 'Y') => Duration::days(365 * num),
                    (false, 'M') => Duration::days(30 * num),
                    (false, 'W') => Duration::weeks(num),
                    (false, 'D') => Duration::days(num),
                    (true, 'H') => Duration::hours(num),
                    (true, 'M') => Duration::minutes(num),
                    (true, 'S') => Duration::seconds(num),
                    _ => return Err(invalid()),
                };
                total += part;
            }
        }
    }

    if !digits.is_empty() {
        return Err(invalid());
    }

    Ok(total)
}

fn unit_duration(num: i64, suffix: char) -> Duration {
    match suffix {
        'w' => Duration::weeks(num),
        'h' => Duration::hours(num),
        'm' => Duration::minutes(num),
        's' => Duration::seconds(num),
        _ => Duration::days(num),
    }
}
