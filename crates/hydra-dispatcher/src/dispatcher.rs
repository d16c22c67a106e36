// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::{Duration, Instant};

use hydra_backend::{Backend, GenerateOpts};
use hydra_cache::ResponseCache;
use hydra_common::HydraError;
use hydra_config::Config;
use hydra_correction::default_max_attempts;
use hydra_scheduler::{Handler, Scheduler};
use hydra_speculative::SpeculationPolicy;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::defaults::{
    DEFAULT_ACCURATE_MODEL, DEFAULT_CONSENSUS_BUDGET, DEFAULT_CRITIC_MODEL, DEFAULT_FAST_MODEL,
    DEFAULT_GENERATOR_MODEL, DEFAULT_MODEL, DEFAULT_RACE_BUDGET, DEFAULT_SPECULATIVE_BUDGET,
    DEFAULT_WAIT_TIMEOUT,
};
use crate::requests::{
    BatchInput, CacheClearInput, CodeInput, ConsensusInput, GenerateInput, QueueBatchInput,
    QueueEnqueueInput, QueueItemInput, QueueWaitInput, RaceInput, SpeculativeInput, ValidateInput,
};

fn parse<T: DeserializeOwned>(input: Value) -> Result<T, HydraError> {
    serde_json::from_value(input).map_err(|e| HydraError::Validation {
        message: format!("invalid input: {e}"),
    })
}

fn build_handler(backend: Arc<dyn Backend>, cache: Arc<ResponseCache>) -> Handler {
    Arc::new(move |prompt, model, _metadata| {
        let backend = Arc::clone(&backend);
        let cache = Arc::clone(&cache);
        Box::pin(async move {
            let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
            let opts = GenerateOpts::default();
            let compute_backend = Arc::clone(&backend);
            let compute_model = model.clone();
            let compute_prompt = prompt.clone();
            let compute = async move {
                compute_backend
                    .generate(&compute_model, &compute_prompt, opts, CancellationToken::new())
                    .await
                    .map(|r| r.text)
            };
            cache.get_or_compute(&model, &prompt, "queue", compute).await
        })
    })
}

/// Statically routes the fixed operation catalog to the Backend Adapter,
/// Response Cache, Speculative Executor, Self-Correction Loop, and
/// Scheduler. One instance is shared across every connection the bin crate's
/// stdio shell serves.
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    cache: Arc<ResponseCache>,
    scheduler: Arc<Scheduler>,
    config: Config,
    started: Instant,
}

impl Dispatcher {
    pub async fn new(backend: Arc<dyn Backend>, config: Config) -> Result<Arc<Self>, HydraError> {
        let cache = Arc::new(ResponseCache::new(&config.cache)?);
        let scheduler = Scheduler::new(config.queue.clone());
        scheduler
            .set_handler(build_handler(Arc::clone(&backend), Arc::clone(&cache)))
            .await;
        Ok(Arc::new(Self {
            backend,
            cache,
            scheduler,
            config,
            started: Instant::now(),
        }))
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Route one `{op, input}` request to its handler. Never panics on bad
    /// input: malformed requests surface as `ValidationError`.
    pub async fn dispatch(&self, op: &str, input: Value) -> Result<Value, HydraError> {
        match op {
            "generate" => self.op_generate(input).await,
            "speculative" => self.op_speculative(input).await,
            "race" => self.op_race(input).await,
            "consensus" => self.op_consensus(input).await,
            "code" => self.op_code(input).await,
            "validate" => self.op_validate(input).await,
            "batch" => self.op_batch(input).await,
            "status" => self.op_status().await,
            "cache_clear" => self.op_cache_clear(input).await,
            "queue_enqueue" => self.op_queue_enqueue(input).await,
            "queue_batch" => self.op_queue_batch(input).await,
            "queue_status" => self.op_queue_status().await,
            "queue_item" => self.op_queue_item(input).await,
            "queue_cancel" => self.op_queue_cancel(input).await,
            "queue_cancel_all" => self.op_queue_cancel_all().await,
            "queue_pause" => self.op_queue_pause().await,
            "queue_resume" => self.op_queue_resume().await,
            "queue_wait" => self.op_queue_wait(input).await,
            other => Err(HydraError::Validation {
                message: format!("unknown operation: {other}"),
            }),
        }
    }

    async fn op_generate(&self, input: Value) -> Result<Value, HydraError> {
        let req: GenerateInput = parse(input)?;
        let model = req.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let mut opts = GenerateOpts::default();
        if let Some(t) = req.temperature {
            opts.temperature = t;
        }
        if let Some(m) = req.max_tokens {
            opts.max_tokens = m;
        }
        let backend = Arc::clone(&self.backend);
        let compute_model = model.clone();
        let compute_prompt = req.prompt.clone();
        let compute = async move {
            backend
                .generate(&compute_model, &compute_prompt, opts, CancellationToken::new())
                .await
                .map(|r| r.text)
        };
        let text = if req.use_cache {
            self.cache.get_or_compute(&model, &req.prompt, "generate", compute).await?
        } else {
            compute.await?
        };
        Ok(json!({ "text": text, "model": model }))
    }

    async fn op_speculative(&self, input: Value) -> Result<Value, HydraError> {
        let req: SpeculativeInput = parse(input)?;
        let fast = req.fast_model.unwrap_or_else(|| DEFAULT_FAST_MODEL.to_string());
        let accurate = req.accurate_model.unwrap_or_else(|| DEFAULT_ACCURATE_MODEL.to_string());
        let budget = req.timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_SPECULATIVE_BUDGET);
        let result = hydra_speculative::race(
            Arc::clone(&self.backend),
            &req.prompt,
            &[fast, accurate],
            SpeculationPolicy::FirstValid,
            GenerateOpts::default(),
            budget,
        )
        .await?;
        Ok(serde_json::to_value(result).expect("SpeculationResult always serializes"))
    }

    async fn op_race(&self, input: Value) -> Result<Value, HydraError> {
        let req: RaceInput = parse(input)?;
        let policy = if req.first_wins {
            SpeculationPolicy::FirstValid
        } else {
            SpeculationPolicy::BestQuality
        };
        let budget = req.timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_RACE_BUDGET);
        let result = hydra_speculative::race(
            Arc::clone(&self.backend),
            &req.prompt,
            &req.models,
            policy,
            GenerateOpts::default(),
            budget,
        )
        .await?;
        Ok(serde_json::to_value(result).expect("SpeculationResult always serializes"))
    }

    async fn op_consensus(&self, input: Value) -> Result<Value, HydraError> {
        let req: ConsensusInput = parse(input)?;
        let budget = req.timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_CONSENSUS_BUDGET);
        let result = hydra_speculative::race(
            Arc::clone(&self.backend),
            &req.prompt,
            &req.models,
            SpeculationPolicy::Consensus,
            GenerateOpts::default(),
            budget,
        )
        .await?;
        Ok(serde_json::to_value(result).expect("SpeculationResult always serializes"))
    }

    async fn op_code(&self, input: Value) -> Result<Value, HydraError> {
        let req: CodeInput = parse(input)?;
        let generator_model = req.generator_model.unwrap_or_else(|| DEFAULT_GENERATOR_MODEL.to_string());
        let critic_model = req.critic_model.unwrap_or_else(|| DEFAULT_CRITIC_MODEL.to_string());
        let max_attempts = req.max_attempts.unwrap_or_else(default_max_attempts);
        let (code, trace) = hydra_correction::generate_with_correction(
            Arc::clone(&self.backend),
            Arc::clone(&self.backend),
            &req.prompt,
            &generator_model,
            &critic_model,
            max_attempts,
            GenerateOpts::default(),
        )
        .await?;
        Ok(json!({ "code": code, "trace": trace }))
    }

    async fn op_validate(&self, input: Value) -> Result<Value, HydraError> {
        let req: ValidateInput = parse(input)?;
        let (language, diagnostics) = hydra_correction::validate_code(&req.code, req.language.as_deref());
        Ok(json!({
            "language": language.as_str(),
            "valid": diagnostics.is_empty(),
            "diagnostics": diagnostics,
        }))
    }

    async fn op_batch(&self, input: Value) -> Result<Value, HydraError> {
        let req: BatchInput = parse(input)?;
        let model = req.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let max_concurrent = req.max_concurrent.unwrap_or(self.config.queue.max_concurrent).max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrent));

        let mut handles = Vec::with_capacity(req.prompts.len());
        for prompt in req.prompts {
            let semaphore = Arc::clone(&semaphore);
            let backend = Arc::clone(&self.backend);
            let cache = Arc::clone(&self.cache);
            let model = model.clone();
            let use_cache = req.use_cache;
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                let opts = GenerateOpts::default();
                let compute_backend = Arc::clone(&backend);
                let compute_model = model.clone();
                let compute_prompt = prompt.clone();
                let compute = async move {
                    compute_backend
                        .generate(&compute_model, &compute_prompt, opts, CancellationToken::new())
                        .await
                        .map(|r| r.text)
                };
                if use_cache {
                    cache.get_or_compute(&model, &prompt, "batch", compute).await
                } else {
                    compute.await
                }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = handle.await.map_err(|e| HydraError::BackendUnavailable {
                message: format!("batch task did not complete: {e}"),
            })?;
            results.push(match outcome {
                Ok(text) => json!({ "text": text, "error": Value::Null }),
                Err(e) => json!({ "text": Value::Null, "error": e.to_json() }),
            });
        }
        Ok(json!({ "results": results, "model": model }))
    }

    async fn op_status(&self) -> Result<Value, HydraError> {
        let health = self.backend.health().await.unwrap_or_default();
        let cache_stats = self.cache.stats().await;
        let queue_stats = self.scheduler.status().await;
        Ok(json!({
            "ollama_host": self.config.ollama_host,
            "log_level": self.config.log_level,
            "backend": { "reachable": health.reachable, "models": health.models },
            "cache": cache_stats,
            "queue": queue_stats,
            "uptime_ms": self.started.elapsed().as_millis() as u64,
        }))
    }

    async fn op_cache_clear(&self, input: Value) -> Result<Value, HydraError> {
        let req: CacheClearInput = parse(input)?;
        match req.older_than_s {
            Some(secs) => self.cache.clear_older_than(secs).await,
            None => self.cache.clear().await?,
        }
        Ok(json!({ "ok": true }))
    }

    async fn op_queue_enqueue(&self, input: Value) -> Result<Value, HydraError> {
        let req: QueueEnqueueInput = parse(input)?;
        let id = self
            .scheduler
            .enqueue(req.prompt, req.model, req.priority, req.metadata, req.per_item_timeout_ms)
            .await;
        Ok(json!({ "id": id }))
    }

    async fn op_queue_batch(&self, input: Value) -> Result<Value, HydraError> {
        let req: QueueBatchInput = parse(input)?;
        let items = req
            .prompts
            .into_iter()
            .map(|prompt| (prompt, req.model.clone(), req.priority, Value::Null))
            .collect();
        let ids = self.scheduler.enqueue_batch(items).await;
        Ok(json!({ "ids": ids }))
    }

    async fn op_queue_status(&self) -> Result<Value, HydraError> {
        let stats = self.scheduler.status().await;
        Ok(serde_json::to_value(stats).expect("QueueStats always serializes"))
    }

    async fn op_queue_item(&self, input: Value) -> Result<Value, HydraError> {
        let req: QueueItemInput = parse(input)?;
        match self.scheduler.item(req.id).await {
            Some(item) => Ok(serde_json::to_value(item).expect("QueueItem always serializes")),
            None => Err(HydraError::Validation {
                message: format!("no such queue item: {}", req.id),
            }),
        }
    }

    async fn op_queue_cancel(&self, input: Value) -> Result<Value, HydraError> {
        let req: QueueItemInput = parse(input)?;
        let cancelled = self.scheduler.cancel(req.id).await;
        Ok(json!({ "cancelled": cancelled }))
    }

    async fn op_queue_cancel_all(&self) -> Result<Value, HydraError> {
        let ids = self.scheduler.cancel_all().await;
        Ok(json!({ "cancelled_ids": ids }))
    }

    async fn op_queue_pause(&self) -> Result<Value, HydraError> {
        self.scheduler.pause().await;
        Ok(json!({ "ok": true }))
    }

    async fn op_queue_resume(&self) -> Result<Value, HydraError> {
        self.scheduler.resume().await;
        Ok(json!({ "ok": true }))
    }

    async fn op_queue_wait(&self, input: Value) -> Result<Value, HydraError> {
        let req: QueueWaitInput = parse(input)?;
        let timeout = req.timeout.map(Duration::from_millis).unwrap_or(DEFAULT_WAIT_TIMEOUT);
        let item = self.scheduler.wait_for(req.id, timeout).await?;
        Ok(serde_json::to_value(item).expect("QueueItem always serializes"))
    }
}
