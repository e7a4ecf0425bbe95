//! Serde helpers for human-readable durations (`2s`, `250ms`, `1m 30s`).
//!
//! Plain integers are read as whole seconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer, de};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Secs(u64),
    Text(String),
}

fn parse(raw: RawDuration) -> Result<Duration, String> {
    match raw {
        RawDuration::Secs(s) => Ok(Duration::from_secs(s)),
        RawDuration::Text(t) => {
            humantime::parse_duration(t.trim()).map_err(|e| format!("invalid duration '{t}': {e}"))
        }
    }
}

/// Serializes as a humantime string.
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

/// Deserializes from a humantime string or whole seconds.
///
/// # Errors
///
/// Fails on unparseable text.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    parse(RawDuration::deserialize(deserializer)?).map_err(de::Error::custom)
}

/// Same format for `Option<Duration>`; `null` or a missing field is `None`.
pub mod option {
    use super::{Deserialize, Deserializer, Duration, RawDuration, Serializer, de, parse};

    /// Serializes `Some` as a humantime string and `None` as unit.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => super::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    /// Deserializes an optional duration.
    ///
    /// # Errors
    ///
    /// Fails on unparseable text.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<RawDuration>::deserialize(deserializer)?
            .map(parse)
            .transpose()
            .map_err(de::Error::custom)
    }
}
