//! Plan execution.
//!
//! Targets run one at a time on the calling thread. The first failure aborts
//! the run and every target still queued is recorded as `NotRun`.

use std::collections::HashSet;
use std::time::Instant;

use serde::Serialize;

use crate::error::Error;
use crate::params::Parameters;
use crate::resolver::{self, ExecutionPlan};
use crate::target::{TargetGraph, TargetId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetStatus {
    Succeeded,
    Skipped { reason: String },
    Failed { reason: String },
    NotRun,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOutcome {
    pub target: String,
    #[serde(flatten)]
    pub status: TargetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub not_run: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub requested: Vec<String>,
    /// Resolved order before any trigger was appended.
    pub plan: Vec<String>,
    pub outcomes: Vec<TargetOutcome>,
    pub status: RunStatus,
    pub summary: RunSummary,
    pub started_at: String,
    pub duration_ms: u64,
    #[serde(skip)]
    pub error: Option<Error>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn outcome(&self, target: &str) -> Option<&TargetStatus> {
        self.outcomes
            .iter()
            .find(|o| o.target == target)
            .map(|o| &o.status)
    }

    /// Names in the order they were processed (including skipped and not-run).
    pub fn order(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.target.as_str()).collect()
    }
}

#[derive(Clone, Copy)]
struct Queued {
    id: TargetId,
    triggered_by: Option<TargetId>,
}

/// Execute `plan` against `graph`, appending triggered targets as they fire.
pub fn run(graph: &TargetGraph, plan: &ExecutionPlan, params: &Parameters) -> RunReport {
    let started_at = chrono::Utc::now().to_rfc3339();
    let started = Instant::now();

    let mut queue: Vec<Queued> = plan
        .order
        .iter()
        .map(|id| Queued {
            id: *id,
            triggered_by: None,
        })
        .collect();
    let mut planned: HashSet<TargetId> = plan.order.iter().copied().collect();
    let mut outcomes = Vec::with_capacity(queue.len());
    let mut failure: Option<Error> = None;
    let mut cursor = 0;

    while cursor < queue.len() {
        let Queued { id, triggered_by } = queue[cursor];
        cursor += 1;
        let target = graph.get(id);
        let triggered_by = triggered_by.map(|t| graph.name(t).to_string());

        if failure.is_some() {
            outcomes.push(TargetOutcome {
                target: target.name.clone(),
                status: TargetStatus::NotRun,
                triggered_by,
                duration_ms: None,
            });
            continue;
        }

        if let Some(condition) = target.failing_condition(params) {
            log_status!("skip", "{} ({} is false)", target.name, condition.label);
            outcomes.push(TargetOutcome {
                target: target.name.clone(),
                status: TargetStatus::Skipped {
                    reason: format!("condition '{}' is false", condition.label),
                },
                triggered_by,
                duration_ms: None,
            });
            continue;
        }

        let missing = target.missing_parameters(params);
        if !missing.is_empty() {
            let err = Error::missing_parameter(&target.name, missing);
            log_status!("fail", "{}", err.message);
            outcomes.push(TargetOutcome {
                target: target.name.clone(),
                status: TargetStatus::Failed {
                    reason: err.message.clone(),
                },
                triggered_by,
                duration_ms: None,
            });
            failure = Some(err);
            continue;
        }

        log_status!("target", "{}", target.name);
        let target_started = Instant::now();
        let result = target.invoke(params);
        let duration_ms = Some(target_started.elapsed().as_millis() as u64);

        if let Err(err) = result {
            let err = err.in_target(&target.name);
            log_status!("fail", "{}", err.message);
            outcomes.push(TargetOutcome {
                target: target.name.clone(),
                status: TargetStatus::Failed {
                    reason: err.message.clone(),
                },
                triggered_by,
                duration_ms,
            });
            failure = Some(err);
            continue;
        }

        outcomes.push(TargetOutcome {
            target: target.name.clone(),
            status: TargetStatus::Succeeded,
            triggered_by,
            duration_ms,
        });

        let fired: Vec<TargetId> = target
            .triggers
            .iter()
            .copied()
            .filter(|t| !planned.contains(t))
            .collect();
        if fired.is_empty() {
            continue;
        }
        match resolver::resolve_appended(graph, &fired, &planned) {
            Ok(appended) => {
                for next in appended {
                    log_status!("trigger", "{} -> {}", target.name, graph.name(next));
                    planned.insert(next);
                    queue.push(Queued {
                        id: next,
                        triggered_by: Some(id),
                    });
                }
            }
            Err(err) => {
                let err = err.in_target(&target.name);
                log_status!("fail", "{}", err.message);
                if let Some(last) = outcomes.last_mut() {
                    last.status = TargetStatus::Failed {
                        reason: err.message.clone(),
                    };
                }
                failure = Some(err);
            }
        }
    }

    let summary = summarize(&outcomes);
    RunReport {
        requested: plan
            .requested
            .iter()
            .map(|id| graph.name(*id).to_string())
            .collect(),
        plan: plan.names(graph),
        status: if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Success
        },
        outcomes,
        summary,
        started_at,
        duration_ms: started.elapsed().as_millis() as u64,
        error: failure,
    }
}

fn summarize(outcomes: &[TargetOutcome]) -> RunSummary {
    let mut summary = RunSummary {
        total: outcomes.len(),
        ..RunSummary::default()
    };
    for outcome in outcomes {
        match outcome.status {
            TargetStatus::Succeeded => summary.succeeded += 1,
            TargetStatus::Skipped { .. } => summary.skipped += 1,
            TargetStatus::Failed { .. } => summary.failed += 1,
            TargetStatus::NotRun => summary.not_run += 1,
        }
    }
    summary
}
