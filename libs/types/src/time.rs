//! Wall-clock helpers
//!
//! Replaces `SystemTime::now().duration_since(UNIX_EPOCH).unwrap()` patterns
//! with versions that cannot panic on a clock set before the epoch.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, 0 if the clock is before the epoch
pub fn safe_system_timestamp_ms() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration_to_ms(duration),
        Err(e) => {
            tracing::warn!("System time before UNIX epoch: {}", e);
            0
        }
    }
}

/// Alias used on hot paths
#[inline]
pub fn current_timestamp_ms() -> u64 {
    safe_system_timestamp_ms()
}

/// Saturating conversion of a duration to whole milliseconds
pub fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(current_timestamp_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_duration_to_ms_saturates() {
        assert_eq!(duration_to_ms(Duration::from_millis(1_500)), 1_500);
        assert_eq!(duration_to_ms(Duration::MAX), u64::MAX);
    }
}
