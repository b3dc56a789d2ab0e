//! Epoch tick conversions
//!
//! The canonical timestamp unit is the signed count of 100-nanosecond ticks
//! since 1970-01-01T00:00:00Z. Everything stored or exchanged uses ticks;
//! calendar math goes through `chrono` in UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

use crate::error::CoreError;

/// Signed 100ns ticks since the Unix epoch
pub type EpochTicks = i64;

/// Number of ticks in one second
pub const TICKS_PER_SECOND: i64 = 10_000_000;

const NANOS_PER_TICK: i64 = 100;

const COMPACT_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Convert a UTC timestamp to epoch ticks
///
/// Fails for instants beyond roughly +/-29000 years, which do not fit in an
/// `i64` tick count.
pub fn ticks_from_datetime(dt: DateTime<Utc>) -> Result<EpochTicks, CoreError> {
    dt.timestamp()
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|ticks| ticks.checked_add(i64::from(dt.timestamp_subsec_nanos()) / NANOS_PER_TICK))
        .ok_or_else(|| CoreError::DateTimeOutOfRange(dt.to_rfc3339()))
}

/// Convert epoch ticks to a UTC timestamp
pub fn datetime_from_ticks(ticks: EpochTicks) -> Result<DateTime<Utc>, CoreError> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK) as u32;
    DateTime::from_timestamp(secs, nanos).ok_or(CoreError::TimestampOutOfRange(ticks))
}

/// The (year, month) containing the given tick value
pub fn year_month(ticks: EpochTicks) -> Result<(i32, u32), CoreError> {
    let dt = datetime_from_ticks(ticks)?;
    Ok((dt.year(), dt.month()))
}

/// Ticks at 00:00:00Z on the first day of the given month
pub fn month_start(year: i32, month: u32) -> Result<EpochTicks, CoreError> {
    let date = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or(CoreError::InvalidMonth { year, month })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or(CoreError::InvalidMonth { year, month })?;
    ticks_from_datetime(midnight.and_utc())
}

/// Ticks at 00:00:00Z on the first day of the month after the given one
pub fn next_month_start(year: i32, month: u32) -> Result<EpochTicks, CoreError> {
    if !(1..=12).contains(&month) {
        return Err(CoreError::InvalidMonth { year, month });
    }
    if month == 12 {
        month_start(year + 1, 1)
    } else {
        month_start(year, month + 1)
    }
}

/// Format ticks as `yyyyMMdd-HHmmss-fffffff` (or without the fraction)
pub fn format_compact(ticks: EpochTicks, full: bool) -> Result<String, CoreError> {
    let dt = datetime_from_ticks(ticks)?;
    let base = dt.format(COMPACT_FORMAT).to_string();
    if full {
        Ok(format!("{}-{:07}", base, ticks.rem_euclid(TICKS_PER_SECOND)))
    } else {
        Ok(base)
    }
}

/// Parse `yyyyMMdd-HHmmss` or `yyyyMMdd-HHmmss-fffffff` as UTC ticks
pub fn parse_compact(text: &str) -> Result<EpochTicks, CoreError> {
    let invalid = || CoreError::InvalidTimeString(text.to_string());
    if !text.is_ascii() {
        return Err(invalid());
    }
    let (base, fraction) = match text.len() {
        15 => (text, None),
        23 if text.as_bytes()[15] == b'-' => (&text[..15], Some(&text[16..])),
        _ => return Err(invalid()),
    };
    let naive = NaiveDateTime::parse_from_str(base, COMPACT_FORMAT).map_err(|_| invalid())?;
    let mut ticks = ticks_from_datetime(naive.and_utc())?;
    if let Some(fraction) = fraction {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        ticks += fraction.parse::<i64>().map_err(|_| invalid())?;
    }
    Ok(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;

    const Y2K: EpochTicks = 946_684_800 * TICKS_PER_SECOND;

    #[test]
    fn test_epoch_is_zero() {
        let epoch = datetime_from_ticks(0).unwrap();
        assert_eq!(epoch.to_rfc3339(), "1970-01-01T00:00:00+00:00");
        assert_eq!(ticks_from_datetime(epoch), Ok(0));
    }

    #[test]
    fn test_month_start_matches_known_value() {
        assert_eq!(month_start(2000, 1).unwrap(), Y2K);
        assert_eq!(next_month_start(1999, 12).unwrap(), Y2K);
    }

    #[test]
    fn test_negative_ticks_round_down() {
        let dt = datetime_from_ticks(-1).unwrap();
        assert_eq!(year_month(-1).unwrap(), (1969, 12));
        assert_eq!(ticks_from_datetime(dt), Ok(-1));
    }

    #[test]
    fn test_far_dates_do_not_fit_in_ticks() {
        use chrono::TimeZone;

        let far = Utc.with_ymd_and_hms(40000, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            ticks_from_datetime(far),
            Err(CoreError::DateTimeOutOfRange(_))
        ));
        let early = Utc.with_ymd_and_hms(-40000, 1, 1, 0, 0, 0).unwrap();
        assert!(ticks_from_datetime(early).is_err());
        assert!(month_start(40000, 1).is_err());

        // Latest whole second that still fits
        let last = DateTime::from_timestamp(i64::MAX / TICKS_PER_SECOND, 0).unwrap();
        assert_eq!(
            ticks_from_datetime(last),
            Ok(i64::MAX / TICKS_PER_SECOND * TICKS_PER_SECOND)
        );
    }

    #[test]
    fn test_year_month_at_boundary() {
        let cutoff = next_month_start(2024, 2).unwrap();
        assert_eq!(year_month(cutoff).unwrap(), (2024, 3));
        assert_eq!(year_month(cutoff - 1).unwrap(), (2024, 2));
    }

    #[test]
    fn test_invalid_month() {
        assert_eq!(
            next_month_start(2024, 13),
            Err(CoreError::InvalidMonth { year: 2024, month: 13 })
        );
        assert!(month_start(2024, 0).is_err());
    }

    #[test]
    fn test_compact_format() {
        let ticks = Y2K + 3 * TICKS_PER_SECOND + 1234;
        assert_eq!(format_compact(ticks, true).unwrap(), "20000101-000003-0001234");
        assert_eq!(format_compact(ticks, false).unwrap(), "20000101-000003");
        assert_eq!(parse_compact("20000101-000003-0001234").unwrap(), ticks);
        assert_eq!(parse_compact("20000101-000003").unwrap(), Y2K + 3 * TICKS_PER_SECOND);
    }

    #[test]
    fn test_compact_parse_rejects_garbage() {
        assert!(parse_compact("2000-01-01").is_err());
        assert!(parse_compact("20000101-000003-00012x4").is_err());
        assert!(parse_compact("20001301-000000").is_err());
    }
}
