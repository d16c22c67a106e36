// SPDX-License-Identifier: MIT
use std::time::Duration;

use async_trait::async_trait;
use hydra_common::HydraError;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Backend, GenerateOpts, GenerateResult, HealthStatus, Usage};

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    total_duration: u64,
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaTagEntry>,
}

#[derive(Deserialize)]
struct OllamaTagEntry {
    name: String,
}

/// `Backend` implementation talking to a real Ollama instance over HTTP.
pub struct OllamaBackend {
    client: reqwest::Client,
    host: String,
}

impl OllamaBackend {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
        }
    }

    fn merge_options(opts: &GenerateOpts) -> Value {
        let mut options = json!({
            "temperature": opts.temperature,
            "num_predict": opts.max_tokens,
        });
        if let (Some(options_map), Value::Object(extra_map)) =
            (options.as_object_mut(), &opts.extra_model_params)
        {
            for (k, v) in extra_map {
                options_map.insert(k.clone(), v.clone());
            }
        }
        options
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        opts: GenerateOpts,
        cancel: CancellationToken,
    ) -> Result<GenerateResult, HydraError> {
        let url = format!("{}/api/generate", self.host);
        let body = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": Self::merge_options(&opts),
        });

        let send_fut = self
            .client
            .post(&url)
            .timeout(opts.request_timeout)
            .json(&body)
            .send();
        tokio::pin!(send_fut);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(model, "generate cancelled before response");
                return Err(HydraError::Cancelled);
            }
            result = &mut send_fut => result,
        };

        let response = response.map_err(|e| classify_transport_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            let retry_after_s = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            if status.as_u16() == 429 {
                return Err(HydraError::RateLimited { retry_after_s });
            }
            return Err(HydraError::BackendHttp {
                status: status.as_u16(),
                message,
            });
        }

        let parse_fut = response.json::<OllamaGenerateResponse>();
        tokio::pin!(parse_fut);
        let parsed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HydraError::Cancelled),
            result = &mut parse_fut => result,
        };
        let parsed = parsed.map_err(|e| HydraError::BackendUnavailable {
            message: format!("malformed response body: {e}"),
        })?;

        Ok(GenerateResult {
            text: parsed.response,
            usage: Usage {
                eval_count: parsed.eval_count,
                total_duration_ns: parsed.total_duration,
            },
        })
    }

    async fn health(&self) -> Result<HealthStatus, HydraError> {
        let url = format!("{}/api/tags", self.host);
        let result = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "ollama health check failed");
                return Ok(HealthStatus::default());
            }
        };

        if !response.status().is_success() {
            return Ok(HealthStatus::default());
        }

        match response.json::<OllamaTagsResponse>().await {
            Ok(tags) => Ok(HealthStatus {
                reachable: true,
                models: tags.models.into_iter().map(|m| m.name).collect(),
            }),
            Err(e) => {
                warn!(error = %e, "ollama health check returned malformed body");
                Ok(HealthStatus::default())
            }
        }
    }
}

fn classify_transport_error(e: &reqwest::Error) -> HydraError {
    if e.is_timeout() {
        HydraError::BackendTimeout {
            message: e.to_string(),
        }
    } else {
        HydraError::BackendUnavailable {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_options_applies_defaults() {
        let opts = GenerateOpts::default();
        let options = OllamaBackend::merge_options(&opts);
        assert_eq!(options["temperature"], 0.3);
        assert_eq!(options["num_predict"], 2048);
    }

    #[test]
    fn merge_options_overlays_extra_params() {
        let mut opts = GenerateOpts::default();
        opts.extra_model_params = json!({"top_k": 40, "temperature": 0.9});
        let options = OllamaBackend::merge_options(&opts);
        assert_eq!(options["top_k"], 40);
        // extra params win over the computed defaults when keys collide.
        assert_eq!(options["temperature"], 0.9);
    }

    #[test]
    fn host_trailing_slash_is_trimmed() {
        let backend = OllamaBackend::new("http://localhost:11434/");
        assert_eq!(backend.host, "http://localhost:11434");
    }
}
