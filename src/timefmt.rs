use chrono::{DateTime, Local, NaiveDateTime};

/// Display format for timestamps handed to consumers.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// rekordbox writes `2024-03-01 21:15:04.123 +00:00`; exports and older
// versions drop the offset and/or the fraction.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f %:z", "%Y-%m-%d %H:%M:%S%.f%:z"];
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", TIMESTAMP_FORMAT];

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp into local wall-clock time.
/// Offset-qualified values are converted to the local zone.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Local).naive_local());
        }
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Render seconds as `HH:MM:SS`. Negative input renders as zero.
pub fn format_duration(seconds: i64) -> String {
    let total = seconds.max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(&at(2024, 3, 1, 21, 5, 9)), "2024-03-01 21:05:09");
    }

    #[test]
    fn test_parse_naive_variants() {
        let expected = at(2024, 3, 1, 21, 15, 4);
        assert_eq!(parse_timestamp("2024-03-01 21:15:04"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-01 21:15:04.250").map(|t| format_timestamp(&t)),
            Some("2024-03-01 21:15:04".to_string())
        );
        assert_eq!(parse_timestamp("2024-03-01T21:15:04"), Some(expected));
        assert_eq!(parse_timestamp("  2024-03-01 21:15:04  "), Some(expected));
    }

    #[test]
    fn test_parse_offset_converts_to_local() {
        let utc = Utc.with_ymd_and_hms(2024, 3, 1, 21, 15, 4).unwrap();
        let expected = utc.with_timezone(&Local).naive_local();
        assert_eq!(parse_timestamp("2024-03-01 21:15:04.000 +00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 21:15:04+00:00"), Some(expected));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-01 00:00:00"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(185), "00:03:05");
        assert_eq!(format_duration(3725), "01:02:05");
        assert_eq!(format_duration(-4), "00:00:00");
    }
}
