//! US equity session classification and Eastern Time conversions.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc, Weekday};
use chrono_tz::America::New_York;

use crate::models::Session;

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Session an instant falls into, judged in New York local time.
///
/// | Weekday window (ET) | Session |
/// |---------------------|---------|
/// | 04:00 - 09:30 | `Pre` |
/// | 09:30 - 16:00 | `Regular` |
/// | 16:00 - 20:00 | `Post` |
/// | otherwise, weekends | `Close` |
///
/// Exchange holidays are not modelled.
pub fn classify_session(at: DateTime<Utc>) -> Session {
    let local = at.with_timezone(&New_York);
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return Session::Close;
    }

    let time = local.time();
    if time >= hm(4, 0) && time < hm(9, 30) {
        Session::Pre
    } else if time >= hm(9, 30) && time < hm(16, 0) {
        Session::Regular
    } else if time >= hm(16, 0) && time < hm(20, 0) {
        Session::Post
    } else {
        Session::Close
    }
}

/// Convert an instant to New York local time with a fixed offset, which is
/// the form used in serialized timestamps.
pub fn to_eastern(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    let local = at.with_timezone(&New_York);
    local.with_timezone(&local.offset().fix())
}

pub fn now_eastern() -> DateTime<FixedOffset> {
    to_eastern(Utc::now())
}

/// Timestamp for an end-of-day observation: 16:00 New York time on `date`.
pub fn end_of_day_timestamp(date: NaiveDate) -> Option<DateTime<Utc>> {
    New_York
        .from_local_datetime(&date.and_time(hm(16, 0)))
        .single()
        .map(|local| local.with_timezone(&Utc))
}
