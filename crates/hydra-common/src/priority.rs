// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Queue admission priority. Lower numeric value means earlier service —
/// `Priority::Urgent` (0) is admitted before `Priority::Background` (4).
///
/// Declared in ascending numeric order so the derived `Ord` matches the
/// "lower numeric = earlier" rule directly: `Priority::Urgent < Priority::High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Urgent = 0,
    High = 1,
    Normal = 2,
    Low = 3,
    Background = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl Priority {
    /// All variants in ascending (most urgent first) order. Used to build
    /// the scheduler's fixed per-priority FIFO array.
    pub const ALL: [Priority; 5] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Background,
    ];

    pub fn as_index(self) -> usize {
        self as usize
    }
}
