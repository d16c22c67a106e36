// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// A point-in-time snapshot of the response cache's counters. Published on
/// demand; fields are read from atomics at the call site so the snapshot
/// itself is a plain value, not a live view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub errors: u64,
    pub avg_read_ms: f64,
    pub avg_write_ms: f64,
    pub last_cleanup_ms: Option<i64>,
}

/// A point-in-time snapshot of the scheduler's counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retries: u64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub tokens_remaining: f64,
    pub handler_active: usize,
    pub uptime_ms: u64,
}

/// Rolling latency window used to compute average/percentile statistics
/// without retaining unbounded history.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: std::collections::VecDeque<f64>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: std::collections::VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, latency_ms: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Nearest-rank percentile over the current window (0.0–1.0).
    pub fn percentile(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((sorted.len() as f64 - 1.0) * p.clamp(0.0, 1.0)).round() as usize;
        sorted[idx]
    }
}
