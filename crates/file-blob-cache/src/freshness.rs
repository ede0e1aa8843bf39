//! TTL freshness decisions

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Whether a file last written at `last_write` is still fresh at `now`.
///
/// A timestamp in the future (clock skew) counts as fresh.
pub fn is_fresh(last_write: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    let age = now - last_write;
    match age.to_std() {
        Ok(age) => age <= ttl,
        Err(_) => true,
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn test_just_written_is_fresh() {
        let now = Utc::now();
        assert!(is_fresh(now, DAY, now));
    }

    #[test]
    fn test_ttl_boundaries() {
        let now = Utc::now();
        let ttl = Duration::from_secs(60);

        let stale = now - TimeDelta::seconds(61);
        assert!(!is_fresh(stale, ttl, now));

        let fresh = now - TimeDelta::seconds(59);
        assert!(is_fresh(fresh, ttl, now));

        let exact = now - TimeDelta::seconds(60);
        assert!(is_fresh(exact, ttl, now));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = Utc::now();
        assert!(is_fresh(now + TimeDelta::seconds(30), DAY, now));
    }

    #[test]
    fn test_zero_ttl() {
        let now = Utc::now();
        assert!(is_fresh(now, Duration::ZERO, now));
        assert!(!is_fresh(now - TimeDelta::milliseconds(1), Duration::ZERO, now));
    }
}
