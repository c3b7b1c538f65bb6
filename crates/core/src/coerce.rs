//! Boundary coercion of loosely-typed input fields.
//!
//! Every raw property read by the normalizer, the track parser and the
//! GPS loader goes through these helpers. They never fail: anything that
//! cannot be read as the requested type becomes `None`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::types::{EpochMillis, FrameId};

/// Naive datetime layouts accepted after RFC 3339 fails. Interpreted as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Read a finite number from a JSON number or a numeric string.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Parse a trimmed string as a finite `f64`.
pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read an integral frame identifier. Fractional values are truncated.
pub fn coerce_frame_id(value: &Value) -> Option<FrameId> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite()).map(|v| v as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| parse_number(trimmed).map(|v| v as i64))
        }
        _ => None,
    }
}

/// Read a non-empty string. Numbers are rendered with their JSON text.
pub fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a timestamp as epoch milliseconds.
///
/// Numbers pass through when finite. Strings are parsed as numbers first,
/// then as RFC 3339, then as naive UTC date-times and plain dates.
pub fn coerce_timestamp(value: &Value) -> Option<EpochMillis> {
    match value {
        Value::Number(_) => coerce_number(value),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// String half of [`coerce_timestamp`].
pub fn parse_timestamp(s: &str) -> Option<EpochMillis> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(n) = parse_number(trimmed) {
        return Some(n);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(datetime_to_epoch_ms(dt.with_timezone(&Utc)));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(datetime_to_epoch_ms(naive.and_utc()));
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| datetime_to_epoch_ms(naive.and_utc()))
}

pub fn datetime_to_epoch_ms(dt: DateTime<Utc>) -> EpochMillis {
    dt.timestamp_millis() as f64
}

/// First key in `keys` whose value coerces to a number.
pub fn first_number(props: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| props.get(*k).and_then(coerce_number))
}

/// First key in `keys` whose value coerces to a non-empty string.
pub fn first_string(props: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| props.get(*k).and_then(coerce_string))
}

/// First key in `keys` whose value coerces to a frame id.
pub fn first_frame_id(props: &Map<String, Value>, keys: &[&str]) -> Option<FrameId> {
    keys.iter().find_map(|k| props.get(*k).and_then(coerce_frame_id))
}

/// First key in `keys` whose value coerces to a timestamp.
pub fn first_timestamp(props: &Map<String, Value>, keys: &[&str]) -> Option<EpochMillis> {
    keys.iter().find_map(|k| props.get(*k).and_then(coerce_timestamp))
}
