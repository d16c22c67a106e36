// SPDX-License-Identifier: MIT
mod backend;
mod mock;
mod ollama;
mod types;

pub use backend::Backend;
pub use mock::{MockBackend, ScriptedBackend};
pub use ollama::OllamaBackend;
pub use types::{GenerateOpts, GenerateResult, HealthStatus, Usage};
