//! Decoding of event timestamps found in log lines.

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};

/// Web server access-log format, e.g. `10/Oct/2023:13:55:36 +0000`.
const ACCESS_LOG_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M:%S%z"];
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
/// Syslog without a year, e.g. `Oct  8 10:00:00`; the year is prepended.
const SYSLOG_FORMAT: &str = "%Y %b %d %H:%M:%S";

/// Decode a timestamp into unix seconds. Returns `None` for anything that
/// is not one of the known formats.
pub fn decode_time(raw: &str) -> Option<i64> {
    decode_time_at(raw, Utc::now())
}

/// Like [`decode_time`], resolving year-less syslog stamps relative to `now`.
pub fn decode_time_at(raw: &str, now: DateTime<Utc>) -> Option<i64> {
    let s = raw.trim().trim_start_matches('[').trim_end_matches(']').trim();
    if s.is_empty() {
        return None;
    }

    if s.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return s.parse::<f64>().ok().map(|v| v.trunc() as i64);
    }

    if let Ok(dt) = DateTime::parse_from_str(s, ACCESS_LOG_FORMAT) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.timestamp());
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&dt).timestamp());
        }
    }

    decode_syslog(s, now)
}

fn decode_syslog(s: &str, now: DateTime<Utc>) -> Option<i64> {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    let parse = |year: i32| {
        NaiveDateTime::parse_from_str(&format!("{year} {collapsed}"), SYSLOG_FORMAT)
            .ok()
            .map(|dt| Utc.from_utc_datetime(&dt).timestamp())
    };

    let ts = parse(now.year())?;
    // December lines read in early January belong to the previous year.
    if ts > now.timestamp() + 86_400 {
        return parse(now.year() - 1);
    }
    Some(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        // 2026-10-18T08:00:00Z
        Utc.timestamp_opt(1_792_310_400, 0).unwrap()
    }

    #[test]
    fn test_access_log_format() {
        assert_eq!(decode_time("10/Oct/2023:13:55:36 +0000"), Some(1_696_946_136));
        assert_eq!(decode_time("[10/Oct/2023:15:55:36 +0200]"), Some(1_696_946_136));
    }

    #[test]
    fn test_iso_formats() {
        assert_eq!(decode_time("2026-10-18T10:00:00+02:00"), Some(1_792_310_400));
        assert_eq!(decode_time("2026-10-18T08:00:00.250Z"), Some(1_792_310_400));
        assert_eq!(decode_time("2026-10-18 08:00:00"), Some(1_792_310_400));
        assert_eq!(decode_time("2026-10-18 10:00:00+0200"), Some(1_792_310_400));
    }

    #[test]
    fn test_epoch_seconds() {
        assert_eq!(decode_time("1700000000"), Some(1_700_000_000));
        assert_eq!(decode_time("1700000000.987"), Some(1_700_000_000));
    }

    #[test]
    fn test_syslog_uses_current_year() {
        // 2026-03-05T06:07:08Z
        assert_eq!(decode_time_at("Mar  5 06:07:08", now()), Some(1_772_690_828));
        assert_eq!(decode_time_at("Oct 18 08:00:00", now()), Some(1_792_310_400));
    }

    #[test]
    fn test_syslog_in_the_future_rolls_back_a_year() {
        let jan = Utc.with_ymd_and_hms(2027, 1, 1, 0, 5, 0).unwrap();
        let ts = decode_time_at("Dec 31 23:59:00", jan).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 0).unwrap().timestamp());
    }

    #[test]
    fn test_garbage_is_rejected() {
        for raw in ["", "-", "yesterday", "32/Foo/2023:99:00:00 +0000", "inf", "1.2.3"] {
            assert_eq!(decode_time(raw), None, "{raw:?}");
        }
    }
}
