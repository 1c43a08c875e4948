//! Command handlers.

use crate::config::{CliConfig, OutputFormat};
use console::style;
use gantry_core::event::Event;
use gantry_core::job::{JobInstance, JobResult, UploadStatus};
use gantry_core::ports::CoverageUploader;
use gantry_core::verdict::{OverallStatus, PipelineVerdict, Severity};
use gantry_core::workflow::Workflow;
use gantry_runner::{
    DirectoryUploader, NoopUploader, RunnerConfig, ShellJobRunner, WorkspaceIsolation,
};
use gantry_scheduler::{
    MatrixExpander, PipelineOutcome, ResultAggregator, Scheduler, TriggerDecision,
    TriggerEvaluator,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

type HandlerResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const DEFAULT_WORKFLOW_FILE: &str = "gantry.yml";

/// Resolve the workflow: explicit path, then configured path, then
/// `gantry.yml` in the current directory, then the built-in default.
pub fn load_workflow(path: Option<&Path>, config: &CliConfig) -> HandlerResult<Workflow> {
    let candidate = path
        .map(Path::to_path_buf)
        .or_else(|| config.workflow_path.clone());

    if let Some(path) = candidate {
        return Ok(Workflow::from_file(&path)?);
    }

    let local = Path::new(DEFAULT_WORKFLOW_FILE);
    if local.exists() {
        return Ok(Workflow::from_file(local)?);
    }

    info!("No workflow file found, using the built-in CI workflow");
    Ok(Workflow::default_ci())
}

/// Write the default workflow.
pub fn init(path: &Path, force: bool) -> HandlerResult {
    if path.exists() && !force {
        println!(
            "{} {} already exists (use --force to overwrite)",
            style("!").yellow(),
            path.display()
        );
        return Ok(());
    }

    std::fs::write(path, Workflow::default_ci().to_yaml()?)?;
    println!("{} Created {}", style("✓").green(), path.display());
    Ok(())
}

/// Validate a workflow file.
pub fn validate(path: Option<PathBuf>, config: &CliConfig) -> HandlerResult {
    let path = path
        .or_else(|| config.workflow_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKFLOW_FILE));
    let workflow = Workflow::from_file(&path)?;

    println!(
        "{} Workflow \"{}\" is valid",
        style("✓").green(),
        workflow.name
    );
    println!("  Jobs: {}", workflow.jobs.len());
    for job in &workflow.jobs {
        let spec = job.spec()?;
        let oses: Vec<&str> = spec.axis_values.iter().map(|os| os.as_str()).collect();
        println!(
            "    - {} ({} steps) on {}",
            job.name,
            job.steps.len(),
            oses.join(", ")
        );
    }
    if let Some(coverage) = &workflow.coverage {
        println!(
            "  Coverage: {} from {} (required: {})",
            coverage.file, coverage.os, coverage.fail_on_error
        );
    }
    Ok(())
}

/// Print the workflow JSON schema.
pub fn schema() -> HandlerResult {
    let schema = schemars::schema_for!(Workflow);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Evaluate an event against the workflow triggers.
pub fn trigger(workflow: &Workflow, event_path: &Path, format: OutputFormat) -> HandlerResult {
    let event = Event::from_json(&std::fs::read_to_string(event_path)?)?;
    let decision = TriggerEvaluator::from_config(&workflow.triggers).evaluate(&event);

    match format {
        OutputFormat::Table => match &decision {
            TriggerDecision::Run => println!(
                "{} {} event triggers \"{}\"",
                style("▶").cyan(),
                event.kind,
                workflow.name
            ),
            TriggerDecision::Skip(reason) => {
                println!("{} Skipped: {}", style("i").blue(), reason)
            }
        },
        _ => emit(&decision, format)?,
    }
    Ok(())
}

/// List expanded job instances.
pub fn expand(workflow: &Workflow, job: Option<&str>, format: OutputFormat) -> HandlerResult {
    let expander = MatrixExpander::new();
    let instances: Vec<JobInstance> = match job {
        Some(name) => {
            let job = workflow
                .job(name)
                .ok_or_else(|| gantry_core::Error::JobNotFound(name.to_string()))?;
            expander.expand(&job.spec()?)
        }
        None => expander.expand_workflow(workflow)?,
    };

    match format {
        OutputFormat::Table => {
            for instance in &instances {
                println!("{}", style(instance.display_name()).bold());
                for (key, value) in &instance.resolved_overrides {
                    println!("    {} = {}", key, value);
                }
            }
        }
        _ => emit(&instances, format)?,
    }
    Ok(())
}

/// Aggregate recorded results.
pub fn aggregate(
    workflow: &Workflow,
    results_path: &Path,
    partial: bool,
    format: OutputFormat,
) -> HandlerResult<ExitCode> {
    let results: Vec<JobResult> =
        serde_json::from_str(&std::fs::read_to_string(results_path)?)?;
    let aggregator = ResultAggregator::from_workflow(workflow);

    let verdict = if partial {
        let expected = MatrixExpander::new().expand_workflow(workflow)?;
        aggregator.aggregate_partial(&expected, results)
    } else {
        aggregator.aggregate(results)
    };

    report_verdict(&verdict, format)?;
    Ok(exit_code(verdict.status))
}

/// Options for a host pipeline run.
pub struct RunOptions {
    pub event: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    pub coverage_dir: Option<PathBuf>,
    pub max_parallel: Option<usize>,
    pub shared_workspace: bool,
}

/// Run the pipeline with the host shell runner.
pub async fn run(
    workflow: Workflow,
    config: &CliConfig,
    options: RunOptions,
    format: OutputFormat,
) -> HandlerResult<ExitCode> {
    let runner = ShellJobRunner::new(RunnerConfig {
        workspace: options
            .workspace
            .or_else(|| config.workspace.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
        isolation: if options.shared_workspace {
            WorkspaceIsolation::Shared
        } else {
            WorkspaceIsolation::PerInstance
        },
        ..Default::default()
    });

    let uploader: Arc<dyn CoverageUploader> =
        match options.coverage_dir.or_else(|| config.coverage_dir.clone()) {
            Some(dir) => Arc::new(DirectoryUploader::new(dir)),
            None => Arc::new(NoopUploader),
        };

    let mut scheduler = Scheduler::new(workflow, Arc::new(runner), uploader);
    if let Some(n) = options.max_parallel.or(config.max_parallel) {
        scheduler = scheduler.with_max_parallel(n);
    }

    let verdict = match options.event {
        Some(path) => {
            let event = Event::from_json(&std::fs::read_to_string(&path)?)?;
            match scheduler.handle(&event).await? {
                PipelineOutcome::Skipped { reason } => {
                    println!("{} Skipped: {}", style("i").blue(), reason);
                    return Ok(ExitCode::SUCCESS);
                }
                PipelineOutcome::Completed { verdict } => verdict,
            }
        }
        None => scheduler.run().await?,
    };

    report_verdict(&verdict, format)?;
    Ok(exit_code(verdict.status))
}

/// Show the CLI configuration.
pub fn show_config(config: &CliConfig) -> HandlerResult {
    println!("Config file: {}", CliConfig::config_path()?.display());
    println!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

/// Update one configuration key.
pub fn set_config(key: &str, value: &str) -> HandlerResult {
    let mut config = CliConfig::load()?;
    config.set(key, value)?;
    config.save()?;
    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}

/// Process exit code for a verdict.
pub fn exit_code(status: OverallStatus) -> ExitCode {
    match status {
        OverallStatus::Success => ExitCode::SUCCESS,
        OverallStatus::Failure => ExitCode::from(1),
        OverallStatus::Pending => ExitCode::from(2),
    }
}

fn report_verdict(verdict: &PipelineVerdict, format: OutputFormat) -> HandlerResult {
    match format {
        OutputFormat::Table => {
            print!("{}", render_verdict(verdict));
            Ok(())
        }
        _ => emit(verdict, format),
    }
}

fn emit<T: Serialize>(value: &T, format: OutputFormat) -> HandlerResult {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

/// Human-readable verdict: one line per instance, then the issues.
pub fn render_verdict(verdict: &PipelineVerdict) -> String {
    let mut out = String::new();

    for result in &verdict.results {
        let mark = if result.status.is_success() {
            style("✓").green()
        } else {
            style("✗").red()
        };
        let coverage = match result.coverage_report.as_ref().map(|r| &r.upload) {
            None => String::new(),
            Some(UploadStatus::NotAttempted) => "  coverage: kept".to_string(),
            Some(UploadStatus::Uploaded { location }) => format!("  coverage: {}", location),
            Some(UploadStatus::Failed { reason }) => format!("  coverage: failed ({})", reason),
        };
        out.push_str(&format!(
            "{} {}  {}ms{}\n",
            mark,
            result.instance.display_name(),
            result.duration_ms,
            coverage
        ));
    }

    for issue in &verdict.issues {
        let label = match issue.severity {
            Severity::Error => style("error").red(),
            Severity::Warning => style("warning").yellow(),
        };
        out.push_str(&format!("{}: {}\n", label, issue));
    }

    let status = match verdict.status {
        OverallStatus::Success => style(verdict.status.to_string()).green(),
        OverallStatus::Failure => style(verdict.status.to_string()).red(),
        OverallStatus::Pending => style(verdict.status.to_string()).yellow(),
    };
    out.push_str(&format!("Pipeline {}\n", status.bold()));
    out
}
