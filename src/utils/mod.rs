//! Common utilities and helpers

pub mod logging;
pub mod path;

use std::time::Duration;

/// Utility functions for BFPU
pub struct Utils;

impl Utils {
    /// Format a duration in words, e.g. `1 hour 2 minutes 5 seconds`.
    /// Zero components are left out; sub-second durations read `0 seconds`.
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let parts = [
            (total_seconds / 86_400, "day"),
            ((total_seconds % 86_400) / 3600, "hour"),
            ((total_seconds % 3600) / 60, "minute"),
            (total_seconds % 60, "second"),
        ];

        let words: Vec<String> = parts
            .iter()
            .filter(|(count, _)| *count > 0)
            .map(|(count, unit)| {
                if *count == 1 {
                    format!("1 {}", unit)
                } else {
                    format!("{} {}s", count, unit)
                }
            })
            .collect();

        if words.is_empty() {
            "0 seconds".to_string()
        } else {
            words.join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(Utils::format_duration(Duration::from_millis(250)), "0 seconds");
        assert_eq!(Utils::format_duration(Duration::from_secs(1)), "1 second");
        assert_eq!(Utils::format_duration(Duration::from_secs(65)), "1 minute 5 seconds");
        assert_eq!(Utils::format_duration(Duration::from_secs(7200)), "2 hours");
        assert_eq!(
            Utils::format_duration(Duration::from_secs(90_061)),
            "1 day 1 hour 1 minute 1 second"
        );
    }
}
