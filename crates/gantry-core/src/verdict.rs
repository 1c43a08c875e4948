//! Pipeline verdicts.

use crate::ids::Os;
use crate::job::{JobResult, JobStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    Failure,
    /// Some expected instances have not reported yet.
    Pending,
}

impl OverallStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, OverallStatus::Success)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OverallStatus::Pending)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Success => "success",
            OverallStatus::Failure => "failure",
            OverallStatus::Pending => "pending",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    JobFailed { message: Option<String> },
    CoverageMissing,
    CoverageEmpty,
    CoverageUploadFailed { reason: String },
    NotReported,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::JobFailed { message: Some(m) } => write!(f, "job failed: {}", m),
            IssueKind::JobFailed { message: None } => f.write_str("job failed"),
            IssueKind::CoverageMissing => f.write_str("coverage report missing"),
            IssueKind::CoverageEmpty => f.write_str("coverage report is empty"),
            IssueKind::CoverageUploadFailed { reason } => {
                write!(f, "coverage upload failed: {}", reason)
            }
            IssueKind::NotReported => f.write_str("no result reported yet"),
        }
    }
}

/// One entry of the per-instance breakdown shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VerdictIssue {
    pub job: String,
    pub os: Os,
    pub severity: Severity,
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl fmt::Display for VerdictIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.job, self.os, self.kind)
    }
}

/// Overall outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineVerdict {
    pub status: OverallStatus,
    pub results: Vec<JobResult>,
    #[serde(default)]
    pub issues: Vec<VerdictIssue>,
}

impl PipelineVerdict {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &JobResult> {
        self.results
            .iter()
            .filter(|r| r.status == JobStatus::Failure)
    }

    pub fn errors(&self) -> impl Iterator<Item = &VerdictIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &VerdictIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }
}
