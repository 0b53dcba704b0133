//! Common types and utilities shared across models.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
///
/// All stored timestamps share this fixed-width UTC form so that string
/// comparison in SQL orders them chronologically.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in storage format
pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// Parse a stored timestamp back into UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Canonical form of an email address used for storage and lookups
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip_is_fixed_width() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 0).unwrap();
        let stored = timestamp(at);
        assert_eq!(stored, "2026-03-01T09:05:00.000Z");
        assert_eq!(parse_timestamp(&stored), Some(at));
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = timestamp(Utc.with_ymd_and_hms(2026, 1, 9, 23, 0, 0).unwrap());
        let later = timestamp(Utc.with_ymd_and_hms(2026, 1, 10, 1, 0, 0).unwrap());
        assert!(earlier < later);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Asha.Rao@Example.ORG "), "asha.rao@example.org");
    }
}
