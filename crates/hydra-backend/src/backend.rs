// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use hydra_common::HydraError;
use tokio_util::sync::CancellationToken;

use crate::{GenerateOpts, GenerateResult, HealthStatus};

/// Thin wrapper around a local-inference runtime. The only
/// implementation shipped is [`crate::OllamaBackend`]; tests use
/// [`crate::MockBackend`]/[`crate::ScriptedBackend`] doubles so the
/// Speculative Executor and Self-Correction Loop can be exercised without a
/// network dependency.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send a single completed-response generation request.
    ///
    /// Must cancel the in-flight call when `cancel` fires or when
    /// `opts.request_timeout` elapses — whichever comes first. Has no
    /// internal retry; retries belong to the Scheduler.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        opts: GenerateOpts,
        cancel: CancellationToken,
    ) -> Result<GenerateResult, HydraError>;

    /// A 5-second reachability probe. Never returns an error for an
    /// unreachable backend — callers read `reachable` instead.
    async fn health(&self) -> Result<HealthStatus, HydraError>;
}
