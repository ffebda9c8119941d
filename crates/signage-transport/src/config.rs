//! Transport configuration (SPEC_FULL.md §4.1 ambient additions).

use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub base_url: String,
    pub server_key: String,
    pub hardware_key: String,
    /// Schema version integer sent with every request (spec.md §6; 7 is
    /// the reference value).
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub request_timeout: Duration,
}

fn default_schema_version() -> u32 {
    7
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>, server_key: impl Into<String>, hardware_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            server_key: server_key.into(),
            hardware_key: hardware_key.into(),
            schema_version: default_schema_version(),
            retry: RetryConfig::default(),
            request_timeout: default_timeout(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
