//! Clock helpers.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// Wall-clock instant stored in error records.
pub type Timestamp = DateTime<Utc>;

/// Current UTC time as RFC 3339 with microseconds, e.g. for event payloads.
///
/// ```
/// let ts = sqlpilot::utils::iso_timestamp();
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    now_utc().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Current UTC time.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Milliseconds since `start`, fractional.
#[must_use]
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_timestamp_is_rfc3339() {
        let ts = iso_timestamp();
        let parsed = DateTime::parse_from_rfc3339(&ts).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_elapsed_ms_grows() {
        let start = Instant::now();
        let first = elapsed_ms(start);
        assert!(elapsed_ms(start) >= first);
    }
}
