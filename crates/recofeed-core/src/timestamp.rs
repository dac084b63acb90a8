// ── Timestamp normalization ──
//
// The backend's serializer emits date-times in three shapes depending on
// its settings: ISO strings, `[y, m, d, h, mi, s, nanos]` arrays, or
// `{year, monthValue, dayOfMonth, ...}` objects. Everything stored in the
// live list uses one canonical form: RFC 3339 UTC, millisecond precision.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Normalize a raw wire timestamp, falling back to the current instant.
pub fn normalize_timestamp(value: Option<&Value>) -> String {
    normalize_timestamp_at(value, Utc::now())
}

/// Like [`normalize_timestamp`], with `now` supplied by the caller.
///
/// Strings pass through untouched. Unrecognized shapes, out-of-range
/// calendar values, and missing timestamps all yield `now`: the timestamp
/// is display metadata, so best effort beats rejecting the event.
pub fn normalize_timestamp_at(value: Option<&Value>, now: DateTime<Utc>) -> String {
    let parsed = match value {
        Some(Value::String(s)) => return s.clone(),
        Some(Value::Array(parts)) => from_sequence(parts),
        Some(Value::Object(fields)) => from_fields(fields),
        _ => None,
    };

    if parsed.is_none() {
        tracing::trace!(?value, "unrecognized timestamp, using processing time");
    }
    canonical(parsed.unwrap_or(now))
}

/// Render an instant in the canonical form.
pub fn canonical(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `[year, month, day, hour, minute, second]` with optional trailing nanos.
fn from_sequence(parts: &[Value]) -> Option<DateTime<Utc>> {
    if !(6..=7).contains(&parts.len()) {
        return None;
    }

    let nums = parts
        .iter()
        .map(Value::as_i64)
        .collect::<Option<Vec<i64>>>()?;

    match nums.as_slice() {
        [year, month, day, hour, minute, second] => {
            build(*year, *month, *day, *hour, *minute, *second, 0)
        }
        [year, month, day, hour, minute, second, nanos] => {
            build(*year, *month, *day, *hour, *minute, *second, *nanos)
        }
        _ => None,
    }
}

/// `{year, monthValue, dayOfMonth, hour?, minute?, second?}`.
fn from_fields(fields: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let required = |key: &str| fields.get(key).and_then(Value::as_i64);
    let optional = |key: &str| fields.get(key).and_then(Value::as_i64).unwrap_or(0);

    build(
        required("year")?,
        required("monthValue")?,
        required("dayOfMonth")?,
        optional("hour"),
        optional("minute"),
        optional("second"),
        optional("nano"),
    )
}

/// Month is 1-based, as on the wire.
fn build(
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
    nanos: i64,
) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )?;
    let nanos = u32::try_from(nanos).ok().filter(|n| *n < 1_000_000_000)?;
    let datetime = date.and_hms_nano_opt(
        u32::try_from(hour).ok()?,
        u32::try_from(minute).ok()?,
        u32::try_from(second).ok()?,
        nanos,
    )?;
    Some(datetime.and_utc())
}
