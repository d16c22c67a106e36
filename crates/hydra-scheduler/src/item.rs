// SPDX-License-Identifier: MIT
use hydra_common::Priority;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueueItemStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl QueueItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueueItemStatus::Completed | QueueItemStatus::Failed | QueueItemStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: u64,
    pub prompt: String,
    pub model: Option<String>,
    pub priority: Priority,
    pub metadata: Value,
    #[serde(skip)]
    pub per_item_timeout_ms: Option<u64>,
    pub status: QueueItemStatus,
    pub enqueued_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub attempts: u32,
    pub response_text: Option<String>,
    pub error: Option<String>,
    pub last_error_kind: Option<String>,
}

impl QueueItem {
    pub fn new(
        id: u64,
        prompt: String,
        model: Option<String>,
        priority: Priority,
        metadata: Value,
        per_item_timeout_ms: Option<u64>,
        enqueued_at: i64,
    ) -> Self {
        Self {
            id,
            prompt,
            model,
            priority,
            metadata,
            per_item_timeout_ms,
            status: QueueItemStatus::Queued,
            enqueued_at,
            started_at: None,
            completed_at: None,
            attempts: 0,
            response_text: None,
            error: None,
            last_error_kind: None,
        }
    }
}
