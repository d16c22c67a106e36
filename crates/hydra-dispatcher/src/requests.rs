// SPDX-License-Identifier: MIT
use hydra_common::Priority;
use serde::Deserialize;
use serde_json::Value;

fn true_default() -> bool {
    true
}

fn first_wins_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct GenerateInput {
    pub prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default = "true_default")]
    pub use_cache: bool,
}

#[derive(Debug, Deserialize)]
pub struct SpeculativeInput {
    pub prompt: String,
    pub fast_model: Option<String>,
    pub accurate_model: Option<String>,
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RaceInput {
    pub prompt: String,
    pub models: Vec<String>,
    #[serde(default = "first_wins_default")]
    pub first_wins: bool,
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ConsensusInput {
    pub prompt: String,
    pub models: Vec<String>,
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CodeInput {
    pub prompt: String,
    pub generator_model: Option<String>,
    pub critic_model: Option<String>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateInput {
    pub code: String,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchInput {
    pub prompts: Vec<String>,
    pub model: Option<String>,
    pub max_concurrent: Option<usize>,
    #[serde(default = "true_default")]
    pub use_cache: bool,
}

#[derive(Debug, Deserialize)]
pub struct CacheClearInput {
    pub older_than_s: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct QueueEnqueueInput {
    pub prompt: String,
    pub model: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub metadata: Value,
    pub per_item_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct QueueBatchInput {
    pub prompts: Vec<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Deserialize)]
pub struct QueueItemInput {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct QueueWaitInput {
    pub id: u64,
    pub timeout: Option<u64>,
}
