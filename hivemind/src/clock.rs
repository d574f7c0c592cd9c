//! UTC timestamps in the hub's canonical wire shape.
//!
//! Every persisted timestamp is RFC-3339 in UTC with millisecond precision
//! and a literal `Z` suffix; governance validates the same shape strictly.

use chrono::{SecondsFormat, Utc};

/// Current instant as `YYYY-MM-DDTHH:MM:SS.sssZ`.
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Today's date as `YYYY-MM-DD`, used for daily log and export file names.
pub fn utc_today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Strict check for `YYYY-MM-DDTHH:MM:SS(.sss)?Z`: the shape must match and
/// the value must parse as a real instant.
pub fn is_strict_utc_timestamp(ts: &str) -> bool {
    let shape_ok = match ts.len() {
        20 => ts.ends_with('Z'),
        24 => ts.ends_with('Z') && ts.as_bytes().get(19) == Some(&b'.'),
        _ => false,
    };
    if !shape_ok || ts.as_bytes().get(10) != Some(&b'T') {
        return false;
    }
    chrono::DateTime::parse_from_rfc3339(ts).is_ok()
}
