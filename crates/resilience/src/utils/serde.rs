//! Serde helpers for configuration types
//!
//! Collaborators keep breaker and retry settings in their own config files;
//! durations there are written as integer milliseconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// `#[serde(with = "duration_millis")]` for `Duration` fields
///
/// ```rust
/// use std::time::Duration;
///
/// use resilience_core::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Probe {
///     #[serde(with = "duration_millis")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::*;

    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    /// Write a `Duration` as whole milliseconds
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Read whole milliseconds into a `Duration`
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Backoff {
        #[serde(with = "duration_millis")]
        initial_delay: Duration,
        #[serde(with = "duration_millis")]
        max_delay: Duration,
        attempts: u32,
    }

    #[test]
    fn test_duration_millis_serialize() {
        let backoff = Backoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            attempts: 3,
        };

        let json = serde_json::to_string(&backoff).unwrap();
        assert_eq!(json, r#"{"initial_delay":100,"max_delay":10000,"attempts":3}"#);
    }

    #[test]
    fn test_duration_millis_deserialize_from_toml() {
        let backoff: Backoff =
            toml::from_str("initial_delay = 250\nmax_delay = 0\nattempts = 1\n").unwrap();

        assert_eq!(backoff.initial_delay, Duration::from_millis(250));
        assert_eq!(backoff.max_delay, Duration::ZERO);
    }

    /// Sub-millisecond precision is truncated on write.
    #[test]
    fn test_duration_millis_truncates_micros() {
        let backoff = Backoff {
            initial_delay: Duration::from_micros(1_999),
            max_delay: Duration::from_millis(5),
            attempts: 1,
        };

        let json = serde_json::to_string(&backoff).unwrap();
        let parsed: Backoff = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.initial_delay, Duration::from_millis(1));
    }

    #[test]
    fn test_duration_millis_rejects_strings() {
        let result: Result<Backoff, _> =
            serde_json::from_str(r#"{"initial_delay":"1s","max_delay":1,"attempts":1}"#);
        assert!(result.is_err());
    }
}
