//! Date/time utilities for friend-circle.
//!
//! Feeds and peer documents carry timestamps in many shapes. Everything is
//! normalised to `DateTime<Utc>` on the way in and formatted for display only
//! at the edges (notification templates).

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Default display timezone for naive timestamps and notifications.
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";

/// Naive date-time layouts tried in order, interpreted in the configured timezone.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Date-only layouts, taken as local midnight.
const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Offset-carrying layouts not covered by RFC 3339 / RFC 2822.
const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S%z"];

/// Parse a timezone name, falling back to UTC for unknown names.
pub fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or(Tz::UTC)
}

/// Parse a timestamp in any of the known formats.
///
/// Offset-aware formats (RFC 3339, RFC 2822, `YYYY-MM-DD HH:MM:SS +ZZZZ`) are
/// honoured as-is; naive formats are interpreted in `tz`.
pub fn parse_timestamp(input: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return localize(naive, tz);
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).and_then(|naive| localize(naive, tz));
        }
    }

    None
}

fn localize(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a DateTime<Utc> to the specified timezone.
///
/// # Arguments
///
/// * `dt` - DateTime in UTC
/// * `timezone` - Timezone name (e.g., "Asia/Shanghai", "UTC")
/// * `format` - Output format string (e.g., "%Y-%m-%d %H:%M")
///
/// Unknown timezone names fall back to formatting in UTC.
pub fn format_utc_datetime(dt: &DateTime<Utc>, timezone: &str, format: &str) -> String {
    let tz: Tz = match timezone.parse() {
        Ok(tz) => tz,
        Err(_) => return dt.format(format).to_string(),
    };
    dt.with_timezone(&tz).format(format).to_string()
}

/// Format with the layout used in notification mails.
pub fn format_published(dt: &DateTime<Utc>, timezone: &str) -> String {
    format_utc_datetime(dt, timezone, "%Y-%m-%d %H:%M")
}
