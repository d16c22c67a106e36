// SPDX-License-Identifier: MIT
mod error;
mod fingerprint;
mod metrics;
mod priority;

pub use error::HydraError;
pub use fingerprint::Fingerprint;
pub use metrics::{CacheStats, LatencyWindow, QueueStats};
pub use priority::Priority;
