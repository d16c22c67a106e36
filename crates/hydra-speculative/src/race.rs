// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hydra_backend::{Backend, GenerateOpts};
use hydra_common::HydraError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{ConsensusGroup, ConsensusInfo, RaceLoser, SpeculationPolicy, SpeculationResult};
use crate::validator::{default_validator, Validator};

struct CallOutcome {
    model: String,
    elapsed_ms: u64,
    result: Result<String, HydraError>,
}

async fn spawn_calls(
    backend: Arc<dyn Backend>,
    prompt: Arc<String>,
    models: &[String],
    opts: GenerateOpts,
    parent_cancel: &CancellationToken,
) -> JoinSet<CallOutcome> {
    let mut set = JoinSet::new();
    for model in models {
        let backend = Arc::clone(&backend);
        let prompt = Arc::clone(&prompt);
        let model = model.clone();
        let opts = opts.clone();
        let cancel = parent_cancel.child_token();
        set.spawn(async move {
            let start = Instant::now();
            let result = backend
                .generate(&model, &prompt, opts, cancel)
                .await
                .map(|r| r.text);
            CallOutcome {
                model,
                elapsed_ms: start.elapsed().as_millis() as u64,
                result,
            }
        });
    }
    set
}

/// Run N backend calls concurrently over the same prompt and select a
/// winner according to `policy`. `budget` bounds the whole race for
/// `BEST_QUALITY`/`CONSENSUS`; `FIRST_VALID` returns as soon as a winner is
/// found and never waits out the full budget.
pub async fn race(
    backend: Arc<dyn Backend>,
    prompt: &str,
    models: &[String],
    policy: SpeculationPolicy,
    opts: GenerateOpts,
    budget: Duration,
) -> Result<SpeculationResult, HydraError> {
    race_with_validator(backend, prompt, models, policy, opts, budget, default_validator()).await
}

pub async fn race_with_validator(
    backend: Arc<dyn Backend>,
    prompt: &str,
    models: &[String],
    policy: SpeculationPolicy,
    opts: GenerateOpts,
    budget: Duration,
    validator: Validator,
) -> Result<SpeculationResult, HydraError> {
    if models.is_empty() {
        return Err(HydraError::Validation {
            message: "race requires at least one model".to_string(),
        });
    }
    let prompt = Arc::new(prompt.to_string());
    let cancel = CancellationToken::new();
    let mut set = spawn_calls(backend, prompt, models, opts, &cancel).await;

    let result = match policy {
        SpeculationPolicy::FirstValid => first_valid(&mut set, &cancel, &validator).await,
        SpeculationPolicy::BestQuality => best_quality(&mut set, &cancel, budget).await,
        SpeculationPolicy::Consensus => consensus(&mut set, &cancel, budget, models).await,
    };
    cancel.cancel();
    set.shutdown().await;
    result
}

async fn first_valid(
    set: &mut JoinSet<CallOutcome>,
    cancel: &CancellationToken,
    validator: &Validator,
) -> Result<SpeculationResult, HydraError> {
    let mut losers = Vec::new();
    while let Some(joined) = set.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(error = %e, "race task panicked or was aborted");
                continue;
            }
        };
        match outcome.result {
            Ok(text) if validator(&text) => {
                cancel.cancel();
                return Ok(SpeculationResult {
                    winner_model: outcome.model,
                    response_text: text,
                    losers,
                    policy_applied: SpeculationPolicy::FirstValid,
                    consensus_info: None,
                });
            }
            Ok(text) => losers.push(RaceLoser {
                model: outcome.model,
                elapsed_ms: outcome.elapsed_ms,
                error: Some(format!("failed validation: {text:?}")),
            }),
            Err(e) => losers.push(RaceLoser {
                model: outcome.model,
                elapsed_ms: outcome.elapsed_ms,
                error: Some(e.to_string()),
            }),
        }
    }
    Err(HydraError::all_backends_failed(
        losers
            .into_iter()
            .map(|l| (l.model, l.error.unwrap_or_default()))
            .collect(),
    ))
}

async fn collect_all(set: &mut JoinSet<CallOutcome>, budget: Duration) -> Vec<CallOutcome> {
    let mut outcomes = Vec::new();
    let deadline = tokio::time::sleep(budget);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            biased;
            _ = &mut deadline => break,
            joined = set.join_next() => {
                match joined {
                    Some(Ok(outcome)) => outcomes.push(outcome),
                    Some(Err(_)) => continue,
                    None => break,
                }
            }
        }
    }
    outcomes
}

async fn best_quality(
    set: &mut JoinSet<CallOutcome>,
    cancel: &CancellationToken,
    budget: Duration,
) -> Result<SpeculationResult, HydraError> {
    let outcomes = collect_all(set, budget).await;
    cancel.cancel();

    let mut best_idx: Option<usize> = None;
    for (idx, outcome) in outcomes.iter().enumerate() {
        let Ok(text) = &outcome.result else { continue };
        let better = match best_idx {
            None => true,
            Some(b) => {
                let best = &outcomes[b];
                let best_text = best.result.as_ref().expect("filtered to ok above");
                match text.len().cmp(&best_text.len()) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Less => false,
                    std::cmp::Ordering::Equal => outcome.elapsed_ms < best.elapsed_ms,
                }
            }
        };
        if better {
            best_idx = Some(idx);
        }
    }

    match best_idx {
        Some(idx) => {
            let losers = outcomes
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, o)| RaceLoser {
                    model: o.model.clone(),
                    elapsed_ms: o.elapsed_ms,
                    error: o.result.as_ref().err().map(|e| e.to_string()),
                })
                .collect();
            let winner = &outcomes[idx];
            Ok(SpeculationResult {
                winner_model: winner.model.clone(),
                response_text: winner.result.clone().expect("filtered to ok above"),
                losers,
                policy_applied: SpeculationPolicy::BestQuality,
                consensus_info: None,
            })
        }
        None => Err(HydraError::all_backends_failed(
            outcomes
                .into_iter()
                .map(|o| (o.model, o.result.err().map(|e| e.to_string()).unwrap_or_default()))
                .collect(),
        )),
    }
}

fn normalize(text: &str) -> String {
    text.trim().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn signature_of(normalized: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    normalized.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

async fn consensus(
    set: &mut JoinSet<CallOutcome>,
    cancel: &CancellationToken,
    budget: Duration,
    models: &[String],
) -> Result<SpeculationResult, HydraError> {
    let outcomes = collect_all(set, budget).await;
    cancel.cancel();

    let ok_outcomes: Vec<&CallOutcome> = outcomes.iter().filter(|o| o.result.is_ok()).collect();
    if ok_outcomes.is_empty() {
        return Err(HydraError::all_backends_failed(
            outcomes
                .into_iter()
                .map(|o| (o.model, o.result.err().map(|e| e.to_string()).unwrap_or_default()))
                .collect(),
        ));
    }

    let mut groups: HashMap<String, (String, Vec<&CallOutcome>)> = HashMap::new();
    for outcome in &ok_outcomes {
        let text = outcome.result.as_ref().unwrap();
        let normalized = normalize(text);
        let sig = signature_of(&normalized);
        groups.entry(sig).or_insert_with(|| (normalized.clone(), Vec::new())).1.push(outcome);
    }

    let list_position: HashMap<&str, usize> =
        models.iter().enumerate().map(|(i, m)| (m.as_str(), i)).collect();

    let n = ok_outcomes.len();
    let mut ranked: Vec<(ConsensusGroup, u64, usize)> = groups
        .iter()
        .map(|(sig, (_, members))| {
            let min_elapsed_ms = members.iter().map(|o| o.elapsed_ms).min().unwrap_or(u64::MAX);
            let min_list_position = members
                .iter()
                .map(|o| list_position.get(o.model.as_str()).copied().unwrap_or(usize::MAX))
                .min()
                .unwrap_or(usize::MAX);
            let group = ConsensusGroup {
                signature: sig.clone(),
                members: members.iter().map(|o| o.model.clone()).collect(),
                votes: members.len(),
            };
            (group, min_elapsed_ms, min_list_position)
        })
        .collect();
    // Ties on vote count are broken by the group's lowest elapsed_ms, then by
    // the earliest position any of its members held in the requested model
    // list — never by the content-hash signature, which carries no meaning
    // for ranking.
    ranked.sort_by(|a, b| {
        b.0.votes
            .cmp(&a.0.votes)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });
    let group_list: Vec<ConsensusGroup> = ranked.into_iter().map(|(g, _, _)| g).collect();

    let max_votes = group_list.first().map(|g| g.votes).unwrap_or(0);
    let agreed = n >= 2 && max_votes >= (n / 2) + 1;

    // Winner representative: member of the largest group (ties broken by
    // lowest elapsed_ms within that group).
    let winning_sig = group_list.first().map(|g| g.signature.clone()).unwrap_or_default();
    let (_, winning_members) = groups.get(&winning_sig).expect("winning group must exist");
    let winner = winning_members
        .iter()
        .min_by_key(|o| o.elapsed_ms)
        .expect("non-empty group");

    let losers = outcomes
        .iter()
        .filter(|o| o.model != winner.model)
        .map(|o| RaceLoser {
            model: o.model.clone(),
            elapsed_ms: o.elapsed_ms,
            error: o.result.as_ref().err().map(|e| e.to_string()),
        })
        .collect();

    Ok(SpeculationResult {
        winner_model: winner.model.clone(),
        response_text: winner.result.clone().expect("filtered to ok above"),
        losers,
        policy_applied: SpeculationPolicy::Consensus,
        consensus_info: Some(ConsensusInfo {
            groups: group_list,
            agreed,
        }),
    })
}
