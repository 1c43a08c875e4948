//! Job templates, expanded instances and their results.

use crate::ids::Os;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Override key to value mapping, e.g. `env_file -> environment_mac.yml`.
pub type Overrides = BTreeMap<String, String>;

/// A job template with an operating-system axis and per-axis overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobSpec {
    pub name: String,
    pub axis_values: Vec<Os>,
    #[serde(default)]
    pub default_overrides: Overrides,
    #[serde(default)]
    pub per_axis_overrides: BTreeMap<Os, Overrides>,
}

/// One concrete job to run: a job on a single operating system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct JobInstance {
    pub job: String,
    pub os: Os,
    #[serde(default)]
    pub resolved_overrides: Overrides,
}

impl JobInstance {
    pub fn new(job: impl Into<String>, os: impl Into<Os>) -> Self {
        Self {
            job: job.into(),
            os: os.into(),
            resolved_overrides: Overrides::new(),
        }
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resolved_overrides.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.resolved_overrides.get(key).map(String::as_str)
    }

    /// Identity of the instance within a pipeline run.
    pub fn key(&self) -> InstanceKey {
        InstanceKey {
            job: self.job.clone(),
            os: self.os.clone(),
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} ({})", self.job, self.os)
    }
}

/// Job name and OS pair identifying an instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceKey {
    pub job: String,
    pub os: Os,
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.job, self.os)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failure,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Success)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Success => f.write_str("success"),
            JobStatus::Failure => f.write_str("failure"),
        }
    }
}

/// Outcome of uploading a coverage report.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadStatus {
    #[default]
    NotAttempted,
    Uploaded {
        location: String,
    },
    Failed {
        reason: String,
    },
}

/// Coverage artifact produced by the coverage-bearing job instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct CoverageReport {
    pub file: String,
    pub content: String,
    #[serde(default)]
    pub upload: UploadStatus,
}

impl CoverageReport {
    pub fn new(file: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            content: content.into(),
            upload: UploadStatus::NotAttempted,
        }
    }

    /// A report is usable when it has content and its upload did not fail.
    pub fn is_valid(&self) -> bool {
        !self.content.trim().is_empty() && !matches!(self.upload, UploadStatus::Failed { .. })
    }
}

/// Result of executing one job instance.
///
/// The derived ordering (job, OS, overrides, status, ...) is the canonical
/// order results take inside a verdict.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    pub instance: JobInstance,
    pub status: JobStatus,
    #[serde(default)]
    pub coverage_report: Option<CoverageReport>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl JobResult {
    pub fn success(instance: JobInstance) -> Self {
        Self {
            instance,
            status: JobStatus::Success,
            coverage_report: None,
            message: None,
            duration_ms: 0,
        }
    }

    pub fn failure(instance: JobInstance, message: impl Into<String>) -> Self {
        Self {
            instance,
            status: JobStatus::Failure,
            coverage_report: None,
            message: Some(message.into()),
            duration_ms: 0,
        }
    }

    pub fn with_coverage(mut self, report: CoverageReport) -> Self {
        self.coverage_report = Some(report);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}
