use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer};

/// Unit suffixes, largest first, with their length in seconds.
const UNITS: [(&str, u64); 4] = [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)];

/// A duration given either as a number of seconds or as a string like `1d 2h 30m 15s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration(std::time::Duration);

impl Duration {
    pub const fn from_secs(seconds: u64) -> Self {
        Self(std::time::Duration::from_secs(seconds))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("`{0}` is not a duration")]
    Malformed(String),

    #[error("the unit `{unit}` in `{input}` is repeated or out of order")]
    UnitOrder { input: String, unit: String },

    #[error("the duration `{0}` is too large")]
    Overflow(String),
}

impl FromStr for Duration {
    type Err = DurationError;

    /// Parses a sequence of `<number><unit>` terms with units `d`, `h`, `m`, `s` in that order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static TERM: OnceLock<Regex> = OnceLock::new();

        let term = TERM.get_or_init(|| {
            Regex::new(r"^\s*(?<value>\d+)(?<unit>[dhms])").expect("the duration regex is valid")
        });

        let malformed = || DurationError::Malformed(s.to_owned());
        let overflow = || DurationError::Overflow(s.to_owned());

        let mut rest = s.trim_end();
        let mut next_unit = 0;
        let mut total = 0u64;

        if rest.trim_start().is_empty() {
            return Err(malformed());
        }

        while !rest.is_empty() {
            let captures = term.captures(rest).ok_or_else(malformed)?;
            let unit = &captures["unit"];

            let idx = UNITS
                .iter()
                .position(|&(suffix, _)| suffix == unit)
                .ok_or_else(malformed)?;

            if idx < next_unit {
                return Err(DurationError::UnitOrder {
                    input: s.to_owned(),
                    unit: unit.to_owned(),
                });
            }

            let value = captures["value"].parse::<u64>().map_err(|_| overflow())?;
            total = value
                .checked_mul(UNITS[idx].1)
                .and_then(|secs| total.checked_add(secs))
                .ok_or_else(overflow)?;

            next_unit = idx + 1;
            rest = &rest[captures.get(0).map_or(rest.len(), |m| m.end())..];
        }

        Ok(Self::from_secs(total))
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a number of seconds or a string like `1h 30m`")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_u64(v.try_into().map_err(E::custom)?)
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Duration::from_secs(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(duration: std::time::Duration) -> Self {
        Self(duration)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(duration: Duration) -> Self {
        duration.0
    }
}
