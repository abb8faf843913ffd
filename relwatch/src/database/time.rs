//! Timestamp helpers for the database layer.
//!
//! Timestamps are stored as `INTEGER` Unix epoch milliseconds (UTC).

use chrono::{DateTime, TimeZone, Utc};

/// Current time as Unix epoch milliseconds (UTC).
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[inline]
pub fn datetime_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Convert Unix epoch milliseconds to `DateTime<Utc>`.
///
/// Out-of-range values clamp to the Unix epoch rather than panicking.
#[inline]
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .earliest()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Milliseconds in a `std::time::Duration`, saturating at `i64::MAX`.
#[inline]
pub fn duration_ms(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip() {
        let dt = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.250Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(ms_to_datetime(datetime_to_ms(dt)), dt);
    }

    #[test]
    fn out_of_range_clamps_to_epoch() {
        assert_eq!(ms_to_datetime(i64::MAX), DateTime::UNIX_EPOCH);
        assert_eq!(duration_ms(std::time::Duration::from_secs(2)), 2000);
    }
}
