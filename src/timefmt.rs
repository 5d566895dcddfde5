/// Civil-timezone conversions and timestamp display formatting.
///
/// All "midnight"-relative window boundaries and displayed timestamps use the
/// chat's fixed civil timezone (CET, with CEST under the EU daylight-saving
/// rule), independent of the server timezone. Archive timestamps themselves
/// stay UTC.
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};

const HOUR: i32 = 3600;

/// Last Sunday of a month, the anchor of the EU daylight-saving transitions.
fn last_sunday(year: i32, month: u32) -> NaiveDate {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid month start");

    let mut day = first_of_next - Duration::days(1);
    while day.weekday() != Weekday::Sun {
        day -= Duration::days(1);
    }
    day
}

/// UTC offset of the civil timezone at the given instant.
///
/// CEST (+02:00) between 01:00 UTC on the last Sunday of March and 01:00 UTC
/// on the last Sunday of October, CET (+01:00) otherwise.
pub fn civil_offset(at: DateTime<Utc>) -> FixedOffset {
    let year = at.year();
    let dst_start = last_sunday(year, 3)
        .and_hms_opt(1, 0, 0)
        .expect("valid transition time")
        .and_utc();
    let dst_end = last_sunday(year, 10)
        .and_hms_opt(1, 0, 0)
        .expect("valid transition time")
        .and_utc();

    if at >= dst_start && at < dst_end {
        FixedOffset::east_opt(2 * HOUR).expect("valid offset")
    } else {
        FixedOffset::east_opt(HOUR).expect("valid offset")
    }
}

/// Convert a UTC instant into civil local time.
pub fn to_civil(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.with_timezone(&civil_offset(at))
}

/// Most recent civil midnight at or before the given instant, as UTC.
pub fn civil_midnight(at: DateTime<Utc>) -> DateTime<Utc> {
    let local = to_civil(at);
    let midnight = local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("valid midnight");
    local
        .offset()
        .from_local_datetime(&midnight)
        .single()
        .expect("fixed offset is unambiguous")
        .with_timezone(&Utc)
}

/// Civil-timezone calendar day of an instant, used for day bucketing.
pub fn civil_day(at: DateTime<Utc>) -> NaiveDate {
    to_civil(at).date_naive()
}

/// Format a timestamp for listings, in civil local time.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    to_civil(at).format("%Y-%m-%d %H:%M").to_string()
}
