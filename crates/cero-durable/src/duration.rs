//! Duration parsing
//!
//! Timeouts and sleeps accept raw milliseconds, a [`std::time::Duration`],
//! or a compound duration string such as `"30s"`, `"1h 30m"` or `"2d"`.
//! Bare numbers are milliseconds, so `parse_duration("5000")` and a numeric
//! `5000` agree.

use std::time::Duration;

/// The input could not be parsed as a duration
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid duration '{input}'")]
pub struct DurationError {
    pub input: String,
}

/// Milliseconds per unit, by unit name and its aliases
fn unit_millis(unit: &str) -> Option<f64> {
    match unit {
        "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => Some(1.0),
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1_000.0),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(60_000.0),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(3_600_000.0),
        "d" | "day" | "days" => Some(86_400_000.0),
        "w" | "wk" | "wks" | "week" | "weeks" => Some(604_800_000.0),
        _ => None,
    }
}

/// Parse a compound duration string into a [`Duration`]
///
/// Terms are `<number><unit>` with units `ms|s|m|h|d|w` (plus common
/// aliases), separated by whitespace or commas; terms sum. A bare number is
/// milliseconds.
///
/// # Example
///
/// ```
/// use cero_durable::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_millis(5_400_000));
/// assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let err = || DurationError {
        input: input.to_string(),
    };

    let mut total_ms: f64 = 0.0;
    let mut terms = 0usize;
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut number = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                chars.next();
            } else {
                break;
            }
        }
        let value: f64 = number.parse().map_err(|_| err())?;

        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }

        let mut unit = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(c);
                chars.next();
            } else {
                break;
            }
        }

        let multiplier = unit_millis(&unit.to_ascii_lowercase()).ok_or_else(err)?;
        total_ms += value * multiplier;
        terms += 1;
    }

    if terms == 0 {
        return Err(err());
    }
    Ok(Duration::from_millis(total_ms.round() as u64))
}

/// A duration argument: milliseconds, a [`Duration`] or a compound string
#[derive(Debug, Clone)]
pub enum DurationSpec {
    Millis(u64),
    Duration(Duration),
    Text(String),
}

impl DurationSpec {
    /// Resolve to a concrete [`Duration`]
    pub fn resolve(&self) -> Result<Duration, DurationError> {
        match self {
            Self::Millis(ms) => Ok(Duration::from_millis(*ms)),
            Self::Duration(d) => Ok(*d),
            Self::Text(s) => parse_duration(s),
        }
    }
}

impl From<u64> for DurationSpec {
    fn from(ms: u64) -> Self {
        Self::Millis(ms)
    }
}

impl From<Duration> for DurationSpec {
    fn from(duration: Duration) -> Self {
        Self::Duration(duration)
    }
}

impl From<&str> for DurationSpec {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for DurationSpec {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_duration("50ms").unwrap(), Duration::from_millis(50));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_aliases() {
        assert_eq!(parse_duration("10 seconds").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("3 mins").unwrap(), Duration::from_secs(180));
        assert_eq!(parse_duration("1 hour").unwrap(), Duration::from_secs(3_600));
        assert_eq!(parse_duration("250 msecs").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_compound() {
        assert_eq!(
            parse_duration("1h 30m").unwrap(),
            Duration::from_millis(5_400_000)
        );
        assert_eq!(
            parse_duration("1d, 2h, 3m").unwrap(),
            Duration::from_secs(86_400 + 7_200 + 180)
        );
    }

    #[test]
    fn test_bare_numbers_are_milliseconds() {
        assert_eq!(parse_duration("5000").unwrap(), Duration::from_millis(5000));
        assert_eq!(
            DurationSpec::from(5000u64).resolve().unwrap(),
            Duration::from_millis(5000)
        );
    }

    #[test]
    fn test_fractions() {
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("0.5s").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("10 fortnights").is_err());
        assert!(parse_duration("h").is_err());
    }

    #[test]
    fn test_spec_conversions() {
        assert_eq!(
            DurationSpec::from("45s").resolve().unwrap(),
            Duration::from_secs(45)
        );
        assert_eq!(
            DurationSpec::from(Duration::from_secs(7)).resolve().unwrap(),
            Duration::from_secs(7)
        );
    }
}
