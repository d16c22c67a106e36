// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hydra_common::HydraError;
use tokio_util::sync::CancellationToken;

use crate::{Backend, GenerateOpts, GenerateResult, HealthStatus, Usage};

/// Deterministic mock backend for tests. Echoes the prompt back, optionally
/// after a fixed delay — useful for exercising race timing without real
/// network latency.
pub struct MockBackend {
    pub reply_prefix: String,
    pub delay: Duration,
}

impl MockBackend {
    pub fn new(reply_prefix: impl Into<String>) -> Self {
        Self {
            reply_prefix: reply_prefix.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn generate(
        &self,
        _model: &str,
        prompt: &str,
        _opts: GenerateOpts,
        cancel: CancellationToken,
    ) -> Result<GenerateResult, HydraError> {
        if !self.delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HydraError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        Ok(GenerateResult {
            text: format!("{}{prompt}", self.reply_prefix),
            usage: Usage {
                eval_count: prompt.len() as u64,
                total_duration_ns: self.delay.as_nanos() as u64,
            },
        })
    }

    async fn health(&self) -> Result<HealthStatus, HydraError> {
        Ok(HealthStatus {
            reachable: true,
            models: vec!["mock-model".into()],
        })
    }
}

/// A pre-scripted backend double. Each call to `generate` pops the next
/// scripted outcome from the front of the queue, or repeats the last one
/// once the queue is drained. Lets tests pin down exact per-attempt
/// behavior (e.g. "fail twice with 503, then succeed").
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Result<GenerateResult, HydraError>>>,
    last: Mutex<Option<Result<GenerateResult, HydraError>>>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Result<GenerateResult, HydraError>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn clone_outcome(
    outcome: &Result<GenerateResult, HydraError>,
) -> Result<GenerateResult, HydraError> {
    match outcome {
        Ok(r) => Ok(r.clone()),
        Err(e) => Err(e.clone()),
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        _opts: GenerateOpts,
        _cancel: CancellationToken,
    ) -> Result<GenerateResult, HydraError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));

        let popped = self.scripts.lock().unwrap().pop_front();
        let outcome = match popped {
            Some(o) => {
                *self.last.lock().unwrap() = Some(clone_outcome(&o));
                o
            }
            None => {
                let last = self.last.lock().unwrap();
                match last.as_ref() {
                    Some(o) => clone_outcome(o),
                    None => Ok(GenerateResult {
                        text: "[no script configured]".into(),
                        usage: Usage::default(),
                    }),
                }
            }
        };
        outcome
    }

    async fn health(&self) -> Result<HealthStatus, HydraError> {
        Ok(HealthStatus {
            reachable: true,
            models: vec!["scripted-model".into()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_echoes_prompt_with_prefix() {
        let b = MockBackend::new("ECHO: ");
        let r = b
            .generate("m", "hi", GenerateOpts::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(r.text, "ECHO: hi");
    }

    #[tokio::test]
    async fn mock_respects_cancellation_during_delay() {
        let b = MockBackend::new("x").with_delay(Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel2.cancel();
        });
        let r = b
            .generate("m", "hi", GenerateOpts::default(), cancel)
            .await;
        assert!(matches!(r, Err(HydraError::Cancelled)));
    }

    #[tokio::test]
    async fn scripted_backend_replays_in_order() {
        let b = ScriptedBackend::new(vec![
            Err(HydraError::BackendHttp {
                status: 503,
                message: "busy".into(),
            }),
            Ok(GenerateResult {
                text: "OK".into(),
                usage: Usage::default(),
            }),
        ]);
        let r1 = b
            .generate("m", "p", GenerateOpts::default(), CancellationToken::new())
            .await;
        assert!(r1.is_err());
        let r2 = b
            .generate("m", "p", GenerateOpts::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(r2.text, "OK");
        assert_eq!(b.call_count(), 2);
    }

    #[tokio::test]
    async fn scripted_backend_repeats_last_outcome_after_exhaustion() {
        let b = ScriptedBackend::new(vec![Ok(GenerateResult {
            text: "ONE".into(),
            usage: Usage::default(),
        })]);
        let _ = b
            .generate("m", "p", GenerateOpts::default(), CancellationToken::new())
            .await;
        let r2 = b
            .generate("m", "p", GenerateOpts::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(r2.text, "ONE");
    }
}
