//! # Interval and timestamp utilities
//!
//! Quiz files describe clip boundaries as `"M:SS"` strings (optionally with a
//! decimal fraction, e.g. `"1:05.5"`). Everything downstream works in seconds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// Parse a `"M:SS[.frac]"` timestamp into seconds (`"M:S"` is accepted too)
pub fn parse_timestamp(value: &str) -> Result<f64> {
    let malformed = || StreamError::MalformedTimestamp { value: value.to_string() };

    let (minutes, seconds) = value.trim().split_once(':').ok_or_else(malformed)?;
    if minutes.is_empty() || !minutes.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed().into());
    }

    let (whole, fraction) = match seconds.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (seconds, None),
    };
    if !(1..=2).contains(&whole.len()) || !whole.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed().into());
    }
    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed().into());
        }
    }

    let minutes: u64 = minutes.parse().map_err(|_| malformed())?;
    let seconds: f64 = seconds.parse().map_err(|_| malformed())?;
    if seconds >= 60.0 {
        return Err(malformed().into());
    }

    Ok(minutes as f64 * 60.0 + seconds)
}

/// Format seconds back into `"M:SS[.frac]"`
pub fn format_timestamp(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor();
    let rest = seconds - minutes * 60.0;
    if rest.fract().abs() < 1e-9 {
        format!("{}:{:02}", minutes as u64, rest as u64)
    } else {
        let formatted = format!("{:06.3}", rest);
        format!("{}:{}", minutes as u64, formatted.trim_end_matches('0'))
    }
}

/// A half-open time range `[start, end)` in seconds with `end > start`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub struct Interval {
    start: f64,
    end: f64,
}

impl Interval {
    /// Create an interval, rejecting empty or inverted ranges
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(StreamError::InvalidInterval { start, end }.into());
        }
        Ok(Self { start, end })
    }

    /// Parse an interval from a pair of `"M:SS"` strings
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Length of the interval in seconds, always positive
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether `other` lies completely inside this interval
    pub fn contains(&self, other: &Interval) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Express this interval relative to a new time origin
    pub fn relative_to(&self, origin: f64) -> Result<Self> {
        Self::new(self.start - origin, self.end - origin)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", format_timestamp(self.start), format_timestamp(self.end))
    }
}

impl TryFrom<(String, String)> for Interval {
    type Error = crate::error::QuizError;

    fn try_from(value: (String, String)) -> Result<Self> {
        Self::parse(&value.0, &value.1)
    }
}

impl From<Interval> for (String, String) {
    fn from(interval: Interval) -> Self {
        (format_timestamp(interval.start), format_timestamp(interval.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval_in_seconds() {
        let interval = Interval::parse("1:10", "1:11").unwrap();
        assert_eq!((interval.start(), interval.end()), (70.0, 71.0));

        let interval = Interval::parse("2:10", "4:09").unwrap();
        assert_eq!((interval.start(), interval.end()), (130.0, 249.0));

        let interval = Interval::parse("0:10", "1:11").unwrap();
        assert_eq!((interval.start(), interval.end()), (10.0, 71.0));
    }

    #[test]
    fn test_single_digit_seconds() {
        assert_eq!(parse_timestamp("0:5").unwrap(), 5.0);
        assert_eq!(Interval::parse("0:5", "1:7").unwrap().duration(), 62.0);
        assert_eq!(parse_timestamp("2:3.5").unwrap(), 123.5);
    }

    #[test]
    fn test_fractional_seconds() {
        assert_eq!(parse_timestamp("0:05.5").unwrap(), 5.5);
        assert_eq!(parse_timestamp("12:00.25").unwrap(), 720.25);
    }

    #[test]
    fn test_duration_is_positive() {
        let interval = Interval::parse("0:05", "0:15").unwrap();
        assert_eq!(interval.duration(), 10.0);
    }

    #[test]
    fn test_inverted_interval_rejected() {
        let err = Interval::parse("0:15", "0:05").unwrap_err();
        assert!(err.to_string().contains("Invalid interval"));
        assert!(Interval::parse("0:05", "0:05").is_err());
    }

    #[test]
    fn test_malformed_timestamps_rejected() {
        for value in ["", "5", "1:", "1:075", "1:75", "a:10", "1:10.", "1:10.x", "-1:10"] {
            assert!(parse_timestamp(value).is_err(), "accepted '{}'", value);
        }
    }

    #[test]
    fn test_relative_interval() {
        let segment = Interval::parse("1:00", "1:30").unwrap();
        let event = Interval::parse("1:10", "1:20").unwrap();
        assert!(segment.contains(&event));

        let relative = event.relative_to(segment.start()).unwrap();
        assert_eq!((relative.start(), relative.end()), (10.0, 20.0));
    }

    #[test]
    fn test_deserialize_from_json_pair() {
        let interval: Interval = serde_json::from_str(r#"["0:05", "0:15"]"#).unwrap();
        assert_eq!(interval.duration(), 10.0);

        let invalid: std::result::Result<Interval, _> = serde_json::from_str(r#"["0:15", "0:05"]"#);
        assert!(invalid.is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(70.0), "1:10");
        assert_eq!(format_timestamp(5.5), "0:05.5");
    }
}
