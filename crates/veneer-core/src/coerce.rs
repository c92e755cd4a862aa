//! Value coercion into a declared column type.
//!
//! Adapters hand back loosely typed values (JSON numbers, spreadsheet text,
//! epoch floats). `coerce` turns each one into the column's canonical value
//! or reports `UnsupportedValue`. Empty strings and nulls become typed nulls.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::error::{Result, VeneerError};
use crate::value::{ColumnType, Value};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

/// Coerce `value` into `target`.
pub fn coerce(value: Value, target: ColumnType) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if target != ColumnType::String {
        if let Value::String(s) = &value {
            if s.trim().is_empty() {
                return Ok(Value::Null);
            }
        }
    }

    match (target, value) {
        (ColumnType::String, Value::String(s)) => Ok(Value::String(s)),
        (ColumnType::String, other) => Ok(Value::String(other.to_string())),

        (ColumnType::Integer, Value::Integer(v)) => Ok(Value::Integer(v)),
        (ColumnType::Integer, Value::Float(v)) => float_to_integer(v).map(Value::Integer),
        (ColumnType::Integer, Value::Boolean(v)) => Ok(Value::Integer(i64::from(v))),
        (ColumnType::Integer, Value::String(s)) => parse_integer(&s).map(Value::Integer),

        (ColumnType::Float, Value::Float(v)) => Ok(Value::Float(v)),
        (ColumnType::Float, Value::Integer(v)) => Ok(Value::Float(v as f64)),
        (ColumnType::Float, Value::String(s)) => parse_float(&s).map(Value::Float),

        (ColumnType::Boolean, Value::Boolean(v)) => Ok(Value::Boolean(v)),
        (ColumnType::Boolean, Value::Integer(0)) => Ok(Value::Boolean(false)),
        (ColumnType::Boolean, Value::Integer(1)) => Ok(Value::Boolean(true)),
        (ColumnType::Boolean, Value::String(s)) => parse_boolean(&s).map(Value::Boolean),

        (ColumnType::Date, Value::Date(v)) => Ok(Value::Date(v)),
        (ColumnType::Date, Value::DateTime(v)) => Ok(Value::Date(v.date_naive())),
        (ColumnType::Date, Value::String(s)) => parse_date(&s).map(Value::Date),

        (ColumnType::Time, Value::Time(v)) => Ok(Value::Time(v)),
        (ColumnType::Time, Value::DateTime(v)) => Ok(Value::Time(v.time())),
        (ColumnType::Time, Value::String(s)) => parse_time(&s).map(Value::Time),

        (ColumnType::DateTime, Value::DateTime(v)) => Ok(Value::DateTime(v)),
        (ColumnType::DateTime, Value::Date(v)) => Ok(Value::DateTime(v.and_time(NaiveTime::MIN).and_utc())),
        (ColumnType::DateTime, Value::Integer(v)) => epoch_to_datetime(v as f64).map(Value::DateTime),
        (ColumnType::DateTime, Value::Float(v)) => epoch_to_datetime(v).map(Value::DateTime),
        (ColumnType::DateTime, Value::String(s)) => parse_datetime(&s).map(Value::DateTime),

        (target, other) => Err(VeneerError::unsupported(format!(
            "cannot coerce {:?} to {}",
            other, target
        ))),
    }
}

fn float_to_integer(v: f64) -> Result<i64> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Ok(v as i64)
    } else {
        Err(VeneerError::unsupported(format!("{} is not an integer", v)))
    }
}

fn strip_separators(s: &str) -> String {
    s.trim().chars().filter(|c| *c != ',' && *c != '_').collect()
}

pub fn parse_integer(s: &str) -> Result<i64> {
    let cleaned = strip_separators(s);
    if let Ok(v) = cleaned.parse::<i64>() {
        return Ok(v);
    }
    match cleaned.parse::<f64>() {
        Ok(v) => float_to_integer(v),
        Err(_) => Err(VeneerError::unsupported(format!("invalid integer: {:?}", s))),
    }
}

pub fn parse_float(s: &str) -> Result<f64> {
    let trimmed = s.trim();
    let (number, scale) = match trimmed.strip_suffix('%') {
        Some(rest) => (rest, 100.0),
        None => (trimmed, 1.0),
    };
    strip_separators(number)
        .parse::<f64>()
        .map(|v| v / scale)
        .map_err(|_| VeneerError::unsupported(format!("invalid float: {:?}", s)))
}

pub fn parse_boolean(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        _ => Err(VeneerError::unsupported(format!("invalid boolean: {:?}", s))),
    }
}

/// Parse the numbers inside a gviz `Date(y,m,d,...)` literal. Months are
/// zero-based in this format.
fn gviz_date_parts(s: &str) -> Option<Vec<i64>> {
    let inner = s.trim().strip_prefix("Date(")?.strip_suffix(')')?;
    inner
        .split(',')
        .map(|p| p.trim().parse::<i64>().ok())
        .collect()
}

fn gviz_date(parts: &[i64]) -> Option<NaiveDate> {
    let year = i32::try_from(*parts.first()?).ok()?;
    let month = u32::try_from(*parts.get(1)? + 1).ok()?;
    let day = u32::try_from(*parts.get(2)?).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn gviz_time(parts: &[i64]) -> Option<NaiveTime> {
    let part = |i: usize| parts.get(i).copied().unwrap_or(0);
    NaiveTime::from_hms_milli_opt(
        u32::try_from(part(0)).ok()?,
        u32::try_from(part(1)).ok()?,
        u32::try_from(part(2)).ok()?,
        u32::try_from(part(3)).ok()?,
    )
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let trimmed = s.trim();
    if let Some(parts) = gviz_date_parts(trimmed) {
        if let Some(date) = gviz_date(&parts) {
            return Ok(date);
        }
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    Err(VeneerError::unsupported(format!("invalid date: {:?}", s)))
}

pub fn parse_time(s: &str) -> Result<NaiveTime> {
    let trimmed = s.trim();

    // gviz timeofday values arrive as "[h, m, s, ms]"
    if let Some(inner) = trimmed.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let parts: Option<Vec<i64>> = inner
            .split(',')
            .map(|p| p.trim().parse::<i64>().ok())
            .collect();
        if let Some(time) = parts.as_deref().and_then(gviz_time) {
            return Ok(time);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("1970-01-01T{}", trimmed)) {
        return Ok(dt.with_timezone(&Utc).time());
    }

    let upper = trimmed.to_ascii_uppercase();
    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(&upper, format) {
            return Ok(time);
        }
    }
    Err(VeneerError::unsupported(format!("invalid time: {:?}", s)))
}

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    let trimmed = s.trim();

    if let Some(parts) = gviz_date_parts(trimmed) {
        let time = gviz_time(parts.get(3..).unwrap_or(&[]));
        if let (Some(date), Some(time)) = (gviz_date(&parts), time) {
            return Ok(date.and_time(time).and_utc());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = parse_date(trimmed) {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    if let Ok(epoch) = trimmed.parse::<f64>() {
        return epoch_to_datetime(epoch);
    }
    Err(VeneerError::unsupported(format!("invalid datetime: {:?}", s)))
}

/// Convert epoch seconds to a UTC instant at microsecond precision, rounding
/// toward negative infinity.
pub fn epoch_to_datetime(seconds: f64) -> Result<DateTime<Utc>> {
    if !seconds.is_finite() {
        return Err(VeneerError::unsupported(format!("invalid epoch: {}", seconds)));
    }
    let scaled = seconds * 1_000_000.0;
    let nearest = scaled.round();
    // absorb representation error before flooring, e.g. 0.3 * 1e6
    let micros = if (scaled - nearest).abs() < 1e-6 { nearest } else { scaled.floor() };
    if micros < i64::MIN as f64 || micros > i64::MAX as f64 {
        return Err(VeneerError::unsupported(format!("epoch out of range: {}", seconds)));
    }
    let micros = micros as i64;
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| VeneerError::unsupported(format!("epoch out of range: {}", seconds)))
}

/// Exact float seconds since the epoch.
pub fn datetime_to_epoch(value: &DateTime<Utc>) -> f64 {
    value.timestamp() as f64 + f64::from(value.nanosecond()) / 1_000_000_000.0
}
