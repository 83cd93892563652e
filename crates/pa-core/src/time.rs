//! Time utilities for PamirAI Assistant

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is set before the Unix epoch.
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Calculate elapsed time in milliseconds since a given timestamp.
///
/// Returns 0 if the given time is in the future.
pub fn elapsed_millis(since: u64) -> u64 {
    current_time_millis().saturating_sub(since)
}

/// Format a millisecond timestamp as a `HH:MM:SS` UTC wall-clock label.
pub fn clock_label(millis: u64) -> String {
    let secs_of_day = (millis / 1000) % 86_400;
    format!(
        "{:02}:{:02}:{:02}",
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_millis_is_positive() {
        assert!(current_time_millis() > 0);
    }

    #[test]
    fn test_elapsed_millis_future_time() {
        let future = current_time_millis() + 1_000_000;
        assert_eq!(elapsed_millis(future), 0);
    }

    #[test]
    fn test_clock_label() {
        assert_eq!(clock_label(0), "00:00:00");
        // 1 day + 13:05:09
        let millis = (86_400 + 13 * 3600 + 5 * 60 + 9) * 1000 + 999;
        assert_eq!(clock_label(millis), "13:05:09");
    }
}
