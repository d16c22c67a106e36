// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectionAction {
    Accept,
    Refine,
    GiveUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionAttempt {
    pub attempt_index: u32,
    pub code_produced: String,
    pub diagnostics: Vec<Diagnostic>,
    pub action: CorrectionAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrectionTrace {
    pub attempts: Vec<CorrectionAttempt>,
}

impl CorrectionTrace {
    /// The outcome of the whole loop is determined by the terminal attempt's action.
    pub fn terminal_action(&self) -> Option<CorrectionAction> {
        self.attempts.last().map(|a| a.action)
    }
}
