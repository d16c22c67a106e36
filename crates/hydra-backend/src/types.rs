// SPDX-License-Identifier: MIT
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-call generation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOpts {
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    pub extra_model_params: Value,
}

impl Default for GenerateOpts {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2048,
            request_timeout: Duration::from_secs(60),
            extra_model_params: Value::Object(Default::default()),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Token usage reported by a single backend call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub eval_count: u64,
    pub total_duration_ns: u64,
}

/// Successful result of a [`crate::Backend::generate`] call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateResult {
    pub text: String,
    pub usage: Usage,
}

/// Result of a [`crate::Backend::health`] call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    pub reachable: bool,
    pub models: Vec<String>,
}
