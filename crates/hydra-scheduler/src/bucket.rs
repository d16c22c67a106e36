// SPDX-License-Identifier: MIT
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Continuous-refill token bucket: tokens accrue at
/// `refill_rate_per_sec` and a take succeeds iff `floor(tokens) >= 1` after
/// refilling, decrementing by exactly 1.
pub struct TokenBucket {
    inner: Mutex<State>,
}

struct State {
    capacity: f64,
    tokens: f64,
    refill_rate_per_sec: f64,
    last_refill_at: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate_per_sec: f64) -> Self {
        Self {
            inner: Mutex::new(State {
                capacity: capacity as f64,
                tokens: capacity as f64,
                refill_rate_per_sec,
                last_refill_at: Instant::now(),
            }),
        }
    }

    fn refill(state: &mut State, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * state.refill_rate_per_sec).min(state.capacity);
        state.last_refill_at = now;
    }

    /// Non-blocking: returns `true` and consumes a token if one is
    /// available after refilling, `false` otherwise.
    pub async fn try_take(&self) -> bool {
        let mut state = self.inner.lock().await;
        Self::refill(&mut state, Instant::now());
        if state.tokens.floor() >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Blocks (without busy-polling) until a token becomes available, then
    /// consumes it.
    pub async fn take(&self) {
        loop {
            let wait = {
                let mut state = self.inner.lock().await;
                Self::refill(&mut state, Instant::now());
                if state.tokens.floor() >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    let secs = deficit / state.refill_rate_per_sec;
                    Some(std::time::Duration::from_secs_f64(secs.max(0.001)))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }

    pub async fn remaining(&self) -> f64 {
        let mut state = self.inner.lock().await;
        Self::refill(&mut state, Instant::now());
        state.tokens
    }
}
