//! Trigger matching and evaluation.

use gantry_core::event::{Event, EventKind, PullRequestAction};
use gantry_core::glob::Glob;
use gantry_core::workflow::{PathFilter, TriggerConfig};
use serde::Serialize;
use std::fmt;

/// Why an event did not start a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TriggerMismatch {
    UnsupportedKind { kind: EventKind },
    MissingBranch,
    UntrackedBranch { branch: String },
    NoMatchingPath,
}

impl fmt::Display for TriggerMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerMismatch::UnsupportedKind { kind } => {
                write!(f, "event kind `{}` does not trigger this workflow", kind)
            }
            TriggerMismatch::MissingBranch => f.write_str("push event carries no branch"),
            TriggerMismatch::UntrackedBranch { branch } => {
                write!(f, "branch `{}` is not tracked", branch)
            }
            TriggerMismatch::NoMatchingPath => f.write_str("no changed path matches the filter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TriggerDecision {
    Run,
    Skip(TriggerMismatch),
}

impl TriggerDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, TriggerDecision::Run)
    }
}

/// Decides whether an incoming event starts a pipeline run.
#[derive(Debug, Clone)]
pub struct TriggerEvaluator {
    pull_request_types: Vec<PullRequestAction>,
    tracked_branches: Vec<Glob>,
    path_filter: PathFilter,
}

impl TriggerEvaluator {
    pub fn new(path_filter: PathFilter, tracked_branches: Vec<Glob>) -> Self {
        Self {
            pull_request_types: PullRequestAction::defaults(),
            tracked_branches,
            path_filter,
        }
    }

    /// Build an evaluator from a workflow's trigger section. A workflow
    /// without a `pull_request` trigger ignores pull request events.
    pub fn from_config(config: &TriggerConfig) -> Self {
        Self {
            pull_request_types: config
                .pull_request
                .as_ref()
                .map(|pr| pr.types.clone())
                .unwrap_or_default(),
            tracked_branches: config.tracked_branches().to_vec(),
            path_filter: config.path_filter(),
        }
    }

    pub fn with_pull_request_types(mut self, types: Vec<PullRequestAction>) -> Self {
        self.pull_request_types = types;
        self
    }

    pub fn should_run(&self, event: &Event) -> bool {
        self.evaluate(event).should_run()
    }

    pub fn evaluate(&self, event: &Event) -> TriggerDecision {
        match event.kind {
            EventKind::Push => {
                let Some(branch) = event.branch.as_deref() else {
                    return TriggerDecision::Skip(TriggerMismatch::MissingBranch);
                };
                if !self.branch_tracked(branch) {
                    return TriggerDecision::Skip(TriggerMismatch::UntrackedBranch {
                        branch: branch.to_string(),
                    });
                }
            }
            kind => match kind.pull_request_action() {
                Some(action) if self.pull_request_types.contains(&action) => {}
                _ => return TriggerDecision::Skip(TriggerMismatch::UnsupportedKind { kind }),
            },
        }

        if self.path_filter.matches(&event.changed_paths) {
            TriggerDecision::Run
        } else {
            TriggerDecision::Skip(TriggerMismatch::NoMatchingPath)
        }
    }

    fn branch_tracked(&self, branch: &str) -> bool {
        self.tracked_branches.iter().any(|p| p.is_match(branch))
    }
}

/// Whether `event` should start a run, given the watched paths and the
/// branches tracked for pushes. Pull requests trigger on the opened,
/// reopened and synchronized actions.
pub fn should_run(event: &Event, path_filter: &PathFilter, tracked_branches: &[Glob]) -> bool {
    TriggerEvaluator::new(path_filter.clone(), tracked_branches.to_vec()).should_run(event)
}
