//! Timestamp parsing and formatting for batch times.

use chrono::{Local, NaiveDate, NaiveDateTime};

use crate::error::TimeError;

/// Canonical batch time rendering, used for literal time columns.
pub const BATCH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Date-time formats tried after ISO-8601, in order.
const DATE_TIME_FORMATS: &[&str] = &["%m/%d/%Y %H:%M", "%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Date-only formats; these resolve to midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse a timestamp in any of the accepted layouts.
///
/// ISO-8601 local date-times (`2019-09-01T15:01:00`) are tried first, then
/// the fixed candidate list. Single-digit days and months are accepted.
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime, TimeError> {
    let s = input.trim();
    if let Ok(dt) = s.parse::<NaiveDateTime>() {
        return Ok(dt);
    }
    for fmt in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Some(dt) = NaiveDate::parse_from_str(s, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Ok(dt);
        }
    }
    Err(TimeError::Unparseable(input.to_string()))
}

pub fn format_batch_time(time: &NaiveDateTime) -> String {
    time.format(BATCH_TIME_FORMAT).to_string()
}

/// Local wall-clock time.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
