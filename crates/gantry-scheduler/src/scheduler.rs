//! Main scheduler orchestration.

use crate::aggregate::ResultAggregator;
use crate::matrix::MatrixExpander;
use crate::triggers::{TriggerDecision, TriggerEvaluator, TriggerMismatch};

use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use gantry_core::Result;
use gantry_core::event::Event;
use gantry_core::ids::RunId;
use gantry_core::job::{JobInstance, JobResult, UploadStatus};
use gantry_core::ports::{CoverageUploader, JobContext, JobRunner};
use gantry_core::verdict::PipelineVerdict;
use gantry_core::workflow::{JobDefinition, Workflow};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};

/// What happened to an incoming event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Skipped { reason: TriggerMismatch },
    Completed { verdict: PipelineVerdict },
}

/// Evaluates events against a workflow and runs the resulting pipelines.
pub struct Scheduler {
    workflow: Workflow,
    evaluator: TriggerEvaluator,
    expander: MatrixExpander,
    aggregator: ResultAggregator,
    runner: Arc<dyn JobRunner>,
    uploader: Arc<dyn CoverageUploader>,
    max_parallel: Option<usize>,
}

impl Scheduler {
    pub fn new(
        workflow: Workflow,
        runner: Arc<dyn JobRunner>,
        uploader: Arc<dyn CoverageUploader>,
    ) -> Self {
        Self {
            evaluator: TriggerEvaluator::from_config(&workflow.triggers),
            expander: MatrixExpander::new(),
            aggregator: ResultAggregator::from_workflow(&workflow),
            workflow,
            runner,
            uploader,
            max_parallel: None,
        }
    }

    /// Default per-job concurrency for jobs whose matrix sets no limit.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = Some(max_parallel.max(1));
        self
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Handle a repository event, running the pipeline if it triggers.
    pub async fn handle(&self, event: &Event) -> Result<PipelineOutcome> {
        match self.evaluator.evaluate(event) {
            TriggerDecision::Skip(reason) => {
                info!(kind = %event.kind, %reason, "Event does not trigger workflow");
                Ok(PipelineOutcome::Skipped { reason })
            }
            TriggerDecision::Run => {
                let verdict = self.run().await?;
                Ok(PipelineOutcome::Completed { verdict })
            }
        }
    }

    /// Run every job instance of the workflow and aggregate the results.
    pub async fn run(&self) -> Result<PipelineVerdict> {
        let run_id = RunId::new();
        let mut jobs = Vec::with_capacity(self.workflow.jobs.len());
        for job in &self.workflow.jobs {
            jobs.push((job, self.expander.expand(&job.spec()?)));
        }

        let span = info_span!("pipeline", %run_id, workflow = %self.workflow.name);
        let verdict = async {
            let total: usize = jobs.iter().map(|(_, instances)| instances.len()).sum();
            info!(jobs = jobs.len(), instances = total, "Starting pipeline run");

            let results: Vec<JobResult> = join_all(
                jobs.into_iter()
                    .map(|(job, instances)| self.run_job(job, instances)),
            )
            .await
            .into_iter()
            .flatten()
            .collect();

            let verdict = self.aggregator.aggregate(results);
            for issue in &verdict.issues {
                warn!(job = %issue.job, os = %issue.os, severity = ?issue.severity, "{}", issue.kind);
            }
            info!(status = %verdict.status, "Pipeline run finished");
            verdict
        }
        .instrument(span)
        .await;

        Ok(verdict)
    }

    async fn run_job(&self, job: &JobDefinition, instances: Vec<JobInstance>) -> Vec<JobResult> {
        let limit = job
            .max_parallel()
            .or(self.max_parallel)
            .unwrap_or(instances.len())
            .max(1);

        stream::iter(instances)
            .map(|instance| {
                let span = info_span!("job", job = %instance.job, os = %instance.os);
                self.run_instance(job, instance).instrument(span)
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }

    async fn run_instance(&self, job: &JobDefinition, instance: JobInstance) -> JobResult {
        let coverage_file = self
            .workflow
            .coverage
            .as_ref()
            .filter(|c| c.applies_to(&instance))
            .map(|c| c.file.clone());

        let ctx = JobContext {
            job: job.clone(),
            instance,
            coverage_file,
        };

        let start = Instant::now();
        let mut result = match self.runner.run(&ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Job runner failed");
                JobResult::failure(ctx.instance.clone(), e.to_string())
                    .with_duration(start.elapsed().as_millis() as u64)
            }
        };

        if let Some(report) = result.coverage_report.as_mut() {
            let status = match self.uploader.upload(&result.instance, report).await {
                Ok(status) => status,
                Err(e) => UploadStatus::Failed {
                    reason: e.to_string(),
                },
            };
            report.upload = status;
        }

        info!(status = %result.status, duration_ms = result.duration_ms, "Job instance finished");
        result
    }
}
