//! HTTP handlers for the finance API. Query parameters arrive camelCase
//! and treat the literal "all" (and blank) as unfiltered; date params are
//! "YYYY-MM-DD" strings parsed leniently, so a malformed date drops the
//! filter instead of failing the request.

pub mod accounts;
pub mod closings;
pub mod commissions;
pub mod events;
pub mod expenses;
pub mod financial;
pub mod operators;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

/// Normalize an optional text filter: trimmed, with blank and the
/// "all" sentinel meaning no filter.
pub(crate) fn filter_value(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "all")
}

pub(crate) fn parse_lenient_date(value: Option<&str>) -> Option<NaiveDate> {
    let raw = value?;
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            warn!(value = raw, "Ignoring unparseable date filter");
            None
        }
    }
}

pub(crate) fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).expect("valid time").and_utc()
}

pub(crate) fn day_end(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59).expect("valid time").and_utc()
}

/// Datetime bounds from a pair of optional date strings. The range only
/// applies when both ends parse.
pub(crate) fn date_range(
    start: Option<&str>,
    end: Option<&str>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match (parse_lenient_date(start), parse_lenient_date(end)) {
        (Some(start), Some(end)) => (Some(day_start(start)), Some(day_end(end))),
        _ => (None, None),
    }
}

/// Boolean query params arrive as strings ("true"/"false").
pub(crate) fn parse_bool(raw: Option<&str>) -> Option<bool> {
    match raw.map(str::trim) {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_and_blank_mean_unfiltered() {
        assert_eq!(filter_value(Some("all".into())), None);
        assert_eq!(filter_value(Some("  ".into())), None);
        assert_eq!(filter_value(None), None);
        assert_eq!(filter_value(Some(" paid ".into())), Some("paid".into()));
    }

    #[test]
    fn date_range_needs_both_ends() {
        let (start, end) = date_range(Some("2026-03-01"), Some("2026-03-31"));
        assert!(start.is_some() && end.is_some());
        assert_eq!(date_range(Some("2026-03-01"), None), (None, None));
        assert_eq!(date_range(Some("garbage"), Some("2026-03-31")), (None, None));
    }

    #[test]
    fn bool_params_parse_strictly() {
        assert_eq!(parse_bool(Some("true")), Some(true));
        assert_eq!(parse_bool(Some("false")), Some(false));
        assert_eq!(parse_bool(Some("yes")), None);
        assert_eq!(parse_bool(None), None);
    }
}
