//! Duration strings for autonomous loops ("30s", "5m", "1h").

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("Invalid duration format. Use 's' for seconds, 'm' for minutes, or 'h' for hours.")]
    InvalidFormat,
}

/// Convert a `<integer><unit>` string to seconds.
pub fn parse_duration(duration: &str) -> Result<u64, DurationError> {
    let unit = duration.chars().last().ok_or(DurationError::InvalidFormat)?;
    let value = &duration[..duration.len() - unit.len_utf8()];

    let multiplier = match unit.to_ascii_lowercase() {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        _ => return Err(DurationError::InvalidFormat),
    };

    let value: u64 = value.parse().map_err(|_| DurationError::InvalidFormat)?;
    value.checked_mul(multiplier).ok_or(DurationError::InvalidFormat)
}

/// Same as [`parse_duration`] but as a [`Duration`].
pub fn parse(duration: &str) -> Result<Duration, DurationError> {
    parse_duration(duration).map(Duration::from_secs)
}
