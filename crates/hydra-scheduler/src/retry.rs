// SPDX-License-Identifier: MIT
use hydra_common::HydraError;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter: `min(base * 2^(attempt-1), max_delay) * (1 ± jitter)`.
/// `attempt` is 1-indexed (the attempt number that just failed).
pub fn backoff_delay(attempt: u32, base_ms: u64, max_delay_ms: u64, jitter: f64) -> Duration {
    let exp = attempt.saturating_sub(1).min(32);
    let raw = base_ms.saturating_mul(1u64 << exp).min(max_delay_ms);
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    let delayed = (raw as f64 * factor).max(0.0) as u64;
    Duration::from_millis(delayed)
}

/// Retry-After takes precedence over computed backoff when present,
/// clamped to `max_delay_ms`.
pub fn retry_delay_for(error: &HydraError, attempt: u32, base_ms: u64, max_delay_ms: u64, jitter: f64) -> Duration {
    if let Some(retry_after_s) = error.retry_after_s() {
        let ms = retry_after_s.saturating_mul(1000).min(max_delay_ms);
        return Duration::from_millis(ms);
    }
    backoff_delay(attempt, base_ms, max_delay_ms, jitter)
}
