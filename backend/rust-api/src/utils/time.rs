use chrono::{DateTime, Datelike, NaiveDate, Utc};
use mongodb::bson::DateTime as BsonDateTime;

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

/// Calendar day of a timestamp as `YYYY-MM-DD`, the format progress entries carry.
pub fn day_string(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

/// Parses a `YYYY-MM-DD` query parameter.
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Half-open `[start, end)` UTC range covering one calendar day.
pub fn day_bounds(day: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = day.and_hms_opt(0, 0, 0)?.and_utc();
    let end = day.succ_opt()?.and_hms_opt(0, 0, 0)?.and_utc();
    Some((start, end))
}

/// First instant of the month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let first = now.date_naive().with_day0(0)?;
    Some(first.and_hms_opt(0, 0, 0)?.and_utc())
}
