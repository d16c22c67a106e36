// SPDX-License-Identifier: MIT
use std::time::Duration;

/// Fallbacks applied when a request omits a model name or budget. Real
/// deployments are expected to override these per-request; nothing here is
/// read from the environment.
pub const DEFAULT_MODEL: &str = "llama3";
pub const DEFAULT_FAST_MODEL: &str = "llama3:8b";
pub const DEFAULT_ACCURATE_MODEL: &str = "llama3:70b";
pub const DEFAULT_GENERATOR_MODEL: &str = "llama3";
pub const DEFAULT_CRITIC_MODEL: &str = "llama3";

pub const DEFAULT_SPECULATIVE_BUDGET: Duration = Duration::from_secs(30);
pub const DEFAULT_RACE_BUDGET: Duration = Duration::from_secs(30);
pub const DEFAULT_CONSENSUS_BUDGET: Duration = Duration::from_secs(30);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
