use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone};

/// Wall-clock format carried in the `X-FORGE-TIME` header. Rendered and
/// parsed in the process-local timezone; `TZ` selects it, and an absent or
/// invalid `TZ` falls back to the platform zone.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maximum tolerated skew between a request timestamp and server now.
pub const CLOCK_SKEW_SECS: i64 = 300;

pub fn format_timestamp(tm: DateTime<Local>) -> String {
    tm.format(DATE_TIME_FORMAT).to_string()
}

pub fn now_string() -> String {
    format_timestamp(Local::now())
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT).ok()?;
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(tm) => Some(tm),
        // DST fold: either reading is inside the skew window.
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

/// True when `raw` parses and lies within [`CLOCK_SKEW_SECS`] of `now`.
pub fn within_skew(raw: &str, now: DateTime<Local>) -> bool {
    match parse_timestamp(raw) {
        Some(tm) => (now - tm).num_seconds().abs() <= CLOCK_SKEW_SECS,
        None => false,
    }
}
