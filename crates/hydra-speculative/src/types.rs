// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeculationPolicy {
    FirstValid,
    BestQuality,
    Consensus,
}

/// A participant that did not win the race: either it lost to a faster/
/// better response, or it produced an error of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceLoser {
    pub model: String,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusGroup {
    pub signature: String,
    pub members: Vec<String>,
    pub votes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusInfo {
    pub groups: Vec<ConsensusGroup>,
    pub agreed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeculationResult {
    pub winner_model: String,
    pub response_text: String,
    pub losers: Vec<RaceLoser>,
    pub policy_applied: SpeculationPolicy,
    pub consensus_info: Option<ConsensusInfo>,
}
