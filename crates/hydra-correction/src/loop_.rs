// SPDX-License-Identifier: MIT
use std::sync::Arc;

use hydra_backend::{Backend, GenerateOpts};
use hydra_common::HydraError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::extract::extract_code_blocks;
use crate::language::detect_language;
use crate::syntax_checks;
use crate::types::{CorrectionAction, CorrectionAttempt, CorrectionTrace, Diagnostic};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn critic_prompt(code: &str) -> String {
    format!(
        "Review the following code. List concrete defects, one per line. \
         If there are none, reply with exactly DONE.\n\n```\n{code}\n```"
    )
}

fn refinement_prompt(original: &str, code: &str, diagnostics: &[Diagnostic]) -> String {
    let notes: String = diagnostics
        .iter()
        .map(|d| format!("- [{}] {}", d.kind, d.message))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{original}\n\nThe previous attempt was:\n```\n{code}\n```\n\n\
         It has the following issues, please fix them:\n{notes}"
    )
}

fn parse_critic_diagnostics(critic_text: &str) -> Vec<Diagnostic> {
    critic_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| Diagnostic {
            kind: "critic".to_string(),
            message: l.to_string(),
        })
        .collect()
}

fn is_done(critic_text: &str) -> bool {
    critic_text.trim().eq_ignore_ascii_case("done")
}

/// Drive the generate → validate → refine loop to completion. Returns the
/// final candidate code alongside the full attempt trace; `GIVE_UP` is a
/// terminal outcome recorded in the trace, not an error.
pub async fn generate_with_correction(
    generator: Arc<dyn Backend>,
    critic: Arc<dyn Backend>,
    prompt: &str,
    generator_model: &str,
    critic_model: &str,
    max_attempts: u32,
    opts: GenerateOpts,
) -> Result<(String, CorrectionTrace), HydraError> {
    let language = detect_language(prompt);
    let mut trace = CorrectionTrace::default();
    let mut current_prompt = prompt.to_string();
    let max_attempts = max_attempts.max(1);

    for attempt_index in 0..max_attempts {
        let candidate = generator
            .generate(generator_model, &current_prompt, opts.clone(), CancellationToken::new())
            .await?;
        let code = extract_code_blocks(&candidate.text).join("\n\n");

        let mut diagnostics = if language == crate::language::Language::Unknown {
            Vec::new()
        } else {
            syntax_checks::check(language, &code)
        };

        let critic_response = critic
            .generate(critic_model, &critic_prompt(&code), opts.clone(), CancellationToken::new())
            .await?;
        let critic_text = critic_response.text;

        if is_done(&critic_text) && diagnostics.is_empty() {
            trace.attempts.push(CorrectionAttempt {
                attempt_index,
                code_produced: code.clone(),
                diagnostics,
                action: CorrectionAction::Accept,
            });
            return Ok((code, trace));
        }

        diagnostics.extend(parse_critic_diagnostics(&critic_text));

        if attempt_index + 1 >= max_attempts {
            trace.attempts.push(CorrectionAttempt {
                attempt_index,
                code_produced: code.clone(),
                diagnostics,
                action: CorrectionAction::GiveUp,
            });
            debug!(attempts = attempt_index + 1, "self-correction exhausted attempts, giving up");
            return Ok((code, trace));
        }

        current_prompt = refinement_prompt(prompt, &code, &diagnostics);
        trace.attempts.push(CorrectionAttempt {
            attempt_index,
            code_produced: code,
            diagnostics,
            action: CorrectionAction::Refine,
        });
    }

    unreachable!("loop always returns before exhausting max_attempts iterations")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_backend::{GenerateResult, HealthStatus};
    use std::sync::Mutex;

    struct ScriptedCalls {
        replies: Mutex<std::collections::VecDeque<String>>,
        call_count: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl Backend for ScriptedCalls {
        async fn generate(
            &self,
            _model: &str,
            _prompt: &str,
            _opts: GenerateOpts,
            _cancel: CancellationToken,
        ) -> Result<GenerateResult, HydraError> {
            *self.call_count.lock().unwrap() += 1;
            let text = self.replies.lock().unwrap().pop_front().unwrap_or_default();
            Ok(GenerateResult { text, ..Default::default() })
        }

        async fn health(&self) -> Result<HealthStatus, HydraError> {
            Ok(HealthStatus::default())
        }
    }

    fn backend(replies: Vec<&str>) -> Arc<ScriptedCalls> {
        Arc::new(ScriptedCalls {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            call_count: Mutex::new(0),
        })
    }

    #[tokio::test]
    async fn accepts_first_candidate_with_exactly_one_generator_and_critic_call() {
        let generator = backend(vec!["```rust\nfn main() {}\n```"]);
        let critic = backend(vec!["DONE"]);
        let (code, trace) = generate_with_correction(
            generator.clone(),
            critic.clone(),
            "write a rust hello world",
            "gen",
            "critic",
            3,
            GenerateOpts::default(),
        )
        .await
        .unwrap();
        assert_eq!(code, "fn main() {}");
        assert_eq!(trace.attempts.len(), 1);
        assert_eq!(trace.terminal_action(), Some(CorrectionAction::Accept));
        assert_eq!(*generator.call_count.lock().unwrap(), 1);
        assert_eq!(*critic.call_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn refines_then_accepts() {
        let generator = backend(vec!["```rust\nfn main() {\n```", "```rust\nfn main() {}\n```"]);
        let critic = backend(vec!["missing closing brace", "DONE"]);
        let (code, trace) = generate_with_correction(
            generator,
            critic,
            "write a rust hello world",
            "gen",
            "critic",
            3,
            GenerateOpts::default(),
        )
        .await
        .unwrap();
        assert_eq!(code, "fn main() {}");
        assert_eq!(trace.attempts.len(), 2);
        assert_eq!(trace.attempts[0].action, CorrectionAction::Refine);
        assert_eq!(trace.attempts[1].action, CorrectionAction::Accept);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let generator = backend(vec!["bad1", "bad2", "bad3"]);
        let critic = backend(vec!["issue a", "issue b", "issue c"]);
        let (_, trace) = generate_with_correction(
            generator,
            critic,
            "write something",
            "gen",
            "critic",
            3,
            GenerateOpts::default(),
        )
        .await
        .unwrap();
        assert_eq!(trace.attempts.len(), 3);
        assert_eq!(trace.terminal_action(), Some(CorrectionAction::GiveUp));
    }
}
