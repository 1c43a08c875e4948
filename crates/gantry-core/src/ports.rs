//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the scheduling policy and the
//! adapters that actually execute jobs and publish coverage.

use crate::Result;
use crate::job::{CoverageReport, JobInstance, JobResult, UploadStatus};
use crate::workflow::JobDefinition;
use async_trait::async_trait;

/// Everything a runner needs to execute one job instance.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job: JobDefinition,
    pub instance: JobInstance,
    /// Coverage file to collect after a successful run, relative to the
    /// workspace. Set only for the coverage-bearing instance.
    pub coverage_file: Option<String>,
}

/// Executes the steps of a job instance.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run the instance to completion. A failing step is reported through
    /// the returned result; `Err` is reserved for infrastructure problems.
    async fn run(&self, ctx: &JobContext) -> Result<JobResult>;
}

/// Publishes coverage reports to an external tracker.
#[async_trait]
pub trait CoverageUploader: Send + Sync {
    async fn upload(&self, instance: &JobInstance, report: &CoverageReport)
    -> Result<UploadStatus>;
}
