// SPDX-License-Identifier: MIT
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hydra_backend::OllamaBackend;
use hydra_dispatcher::Dispatcher;
use serde_json::{json, Value};

/// Local-inference acceleration layer in front of Ollama: speculative
/// racing, self-correction, and a priority-scheduled response cache.
///
/// Reads newline-delimited JSON requests `{"id", "op", "input"}` from
/// stdin and writes newline-delimited JSON responses `{"id", "result"}` or
/// `{"id", "error"}` to stdout.
#[derive(Parser, Debug)]
#[command(name = "hydra", version, about)]
struct Cli {
    /// Path to an additional config file layered on top of the search-path
    /// defaults and environment overrides.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = hydra_config::load(cli.config.as_deref())?;
    hydra_config::init_logging(&config.log_level);

    tracing::info!(ollama_host = %config.ollama_host, "starting hydra");

    let backend = Arc::new(OllamaBackend::new(config.ollama_host.clone()));
    let dispatcher = Dispatcher::new(backend, config)
        .await
        .context("failed to initialize dispatcher")?;

    run_stdio_shell(dispatcher).await
}

#[derive(serde::Deserialize)]
struct Request {
    id: Value,
    op: String,
    #[serde(default)]
    input: Value,
}

async fn run_stdio_shell(dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line.context("reading request from stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => match dispatcher.dispatch(&request.op, request.input).await {
                Ok(result) => json!({ "id": request.id, "result": result }),
                Err(e) => json!({ "id": request.id, "error": e.to_json() }),
            },
            Err(e) => {
                tracing::warn!(error = %e, "malformed request line");
                json!({
                    "id": Value::Null,
                    "error": {
                        "kind": "ValidationError",
                        "message": format!("malformed request: {e}"),
                        "retryable": false,
                    },
                })
            }
        };

        writeln!(stdout, "{}", serde_json::to_string(&response)?)
            .context("writing response to stdout")?;
        stdout.flush().context("flushing stdout")?;
    }

    Ok(())
}
