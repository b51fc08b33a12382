//! Date parsing for the many formats event listings use.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parse a date string into a naive local datetime.
///
/// Tries RFC 3339 first (the common JSON-LD shape), then a list of
/// datetime and date-only formats; date-only inputs land at midnight.
#[must_use]
pub fn parse_event_date(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_offset() {
        let parsed = parse_event_date("2024-07-15T21:00:00+03:00").expect("parses");
        assert_eq!(parsed.to_string(), "2024-07-15 21:00:00");
    }

    #[test]
    fn parses_bare_iso_date_at_midnight() {
        let parsed = parse_event_date("2024-07-15").expect("parses");
        assert_eq!(parsed.to_string(), "2024-07-15 00:00:00");
    }

    #[test]
    fn parses_european_numeric_dates() {
        assert!(parse_event_date("15/07/2024").is_some());
        assert!(parse_event_date("15.07.2024 20:30").is_some());
    }

    #[test]
    fn parses_written_month_names() {
        assert!(parse_event_date("July 15, 2024").is_some());
        assert!(parse_event_date("15 July 2024").is_some());
    }

    #[test]
    fn rejects_unparseable_text() {
        assert!(parse_event_date("every full moon").is_none());
        assert!(parse_event_date("").is_none());
    }
}
