//! Custom serde helpers for upstream wire formats.

/// Deserializes an `f64` sent either as a JSON number or as a decimal string.
///
/// The ticker stream quotes every numeric field as a string (`"c": "50123.45"`).
pub mod f64_lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(n),
            Raw::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| serde::de::Error::custom(format!("Invalid number: {:?}", s))),
        }
    }
}

/// Deserializes optional Unix-millis into `Option<DateTime<Utc>>`.
pub mod timestamp_ms_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<i64>::deserialize(deserializer)? {
            None => Ok(None),
            Some(millis) => DateTime::<Utc>::from_timestamp_millis(millis)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("Invalid timestamp: {}", millis))),
        }
    }
}
