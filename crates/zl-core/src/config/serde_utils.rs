//! Shared serialization/deserialization utilities for configuration
//!
//! Durations are written as plain integers so the TOML stays hand-editable.

/// Helper module for Duration serialization as seconds
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "zl_core::config::serde_utils::duration_secs")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a Duration as seconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize a Duration from seconds (u64)
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Helper module for Duration serialization as milliseconds
pub mod duration_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a Duration as milliseconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    /// Deserialize a Duration from milliseconds (u64)
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
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        #[serde(with = "duration_secs")]
        timeout: Duration,
        #[serde(with = "duration_millis")]
        interval: Duration,
    }

    #[test]
    fn test_duration_serialize() {
        let config = TestConfig {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(250),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"timeout":30,"interval":250}"#);
    }

    #[test]
    fn test_duration_deserialize() {
        let json = r#"{"timeout":60,"interval":1000}"#;
        let config: TestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.interval, Duration::from_secs(1));
    }
}
