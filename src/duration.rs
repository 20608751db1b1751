//! Human-friendly duration values used for backup age thresholds.
//!
//! Thresholds are written as strings in the configuration (`"6h"`,
//! `"1h30m"`, `"2days"`) and parsed strictly: anything `humantime` does not
//! understand is rejected at load time instead of silently becoming zero.
//!
//! The zero duration doubles as "not configured" during default resolution.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Error for duration strings that cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid duration {input:?}: {reason}")]
pub struct DurationParseError {
    pub input: String,
    pub reason: String,
}

/// Exact elapsed-time value with a human-friendly text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AgeDuration(Duration);

impl AgeDuration {
    /// The unset/zero threshold.
    pub const ZERO: Self = Self(Duration::ZERO);

    pub const fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    #[inline]
    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Total length in nanoseconds, the unit thresholds are compared in.
    #[inline]
    pub const fn as_nanos(&self) -> u128 {
        self.0.as_nanos()
    }
}

impl From<Duration> for AgeDuration {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl FromStr for AgeDuration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // humantime insists on a unit, but a bare zero is unambiguous
        if trimmed == "0" {
            return Ok(Self::ZERO);
        }
        humantime::parse_duration(trimmed)
            .map(Self)
            .map_err(|e| DurationParseError {
                input: s.to_string(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Display for AgeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0s");
        }
        write!(f, "{}", humantime::format_duration(self.0))
    }
}

impl Serialize for AgeDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AgeDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_forms() {
        assert_eq!("6h".parse::<AgeDuration>().unwrap(), AgeDuration::from_secs(6 * 3600));
        assert_eq!("90m".parse::<AgeDuration>().unwrap(), AgeDuration::from_secs(90 * 60));
        assert_eq!(
            "1h30m".parse::<AgeDuration>().unwrap(),
            AgeDuration::from_secs(90 * 60)
        );
        assert_eq!(
            "2days".parse::<AgeDuration>().unwrap(),
            AgeDuration::from_secs(2 * 86_400)
        );
    }

    #[test]
    fn test_parse_zero() {
        assert!("0".parse::<AgeDuration>().unwrap().is_zero());
        assert!("0s".parse::<AgeDuration>().unwrap().is_zero());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<AgeDuration>().is_err());
        assert!("soon".parse::<AgeDuration>().is_err());
        assert!("12".parse::<AgeDuration>().is_err());
        assert!("-1h".parse::<AgeDuration>().is_err());
    }

    #[test]
    fn test_display_reparses() {
        let original = AgeDuration::from_secs(6 * 3600 + 15 * 60);
        let reparsed: AgeDuration = original.to_string().parse().unwrap();
        assert_eq!(original, reparsed);
        assert_eq!(AgeDuration::ZERO.to_string(), "0s");
    }

    #[test]
    fn test_serde_string_form() {
        let parsed: AgeDuration = serde_json::from_str("\"12h\"").unwrap();
        assert_eq!(parsed, AgeDuration::from_secs(12 * 3600));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"12h\"");
        assert!(serde_json::from_str::<AgeDuration>("\"twelve\"").is_err());
    }

    #[test]
    fn test_ordering_is_by_length() {
        let warn: AgeDuration = "1h".parse().unwrap();
        let error: AgeDuration = "2h".parse().unwrap();
        assert!(warn < error);
        assert!(warn.as_nanos() < error.as_nanos());
    }
}
