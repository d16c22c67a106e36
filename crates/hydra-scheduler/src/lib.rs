// SPDX-License-Identifier: MIT
mod bucket;
mod item;
mod retry;
mod scheduler;

pub use bucket::TokenBucket;
pub use item::{QueueItem, QueueItemStatus};
pub use retry::{backoff_delay, retry_delay_for};
pub use scheduler::{BoxFuture, Handler, Scheduler};
