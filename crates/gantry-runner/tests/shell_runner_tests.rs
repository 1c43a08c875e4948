//! Host execution tests. These spawn `sh`, so they only run on Unix.
#![cfg(unix)]

use gantry_core::job::{JobInstance, JobStatus, UploadStatus};
use gantry_core::ports::{CoverageUploader, JobContext, JobRunner};
use gantry_core::workflow::{JobDefinition, StepDefinition};
use gantry_runner::{
    DirectoryUploader, NoopUploader, RunnerConfig, ShellJobRunner, WorkspaceIsolation,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn job(steps: Vec<StepDefinition>) -> JobDefinition {
    JobDefinition {
        name: "tests".to_string(),
        display_name: None,
        runs_on: None,
        matrix: None,
        env: BTreeMap::new(),
        steps,
    }
}

fn runner(workspace: &TempDir) -> ShellJobRunner {
    ShellJobRunner::new(RunnerConfig {
        workspace: workspace.path().to_path_buf(),
        ..Default::default()
    })
}

fn context(job: JobDefinition, coverage_file: Option<&str>) -> JobContext {
    JobContext {
        job,
        instance: JobInstance::new("tests", "ubuntu-22.04")
            .with_override("env_file", "environment_no_cuda.yml"),
        coverage_file: coverage_file.map(str::to_string),
    }
}

fn instance_dir(runner: &ShellJobRunner, ctx: &JobContext) -> PathBuf {
    runner.config().instance_dir(&ctx.instance)
}

/// Step that fails if a sibling instance rewrites `state.txt` while it sleeps.
fn racing_step() -> StepDefinition {
    StepDefinition::new(
        "race",
        "echo $GANTRY_OS > state.txt; sleep 0.3; test \"$(cat state.txt)\" = \"$GANTRY_OS\"",
    )
}

async fn run_siblings(runner: ShellJobRunner) -> Vec<JobStatus> {
    let runner = Arc::new(runner);
    let contexts: Vec<JobContext> = ["ubuntu-22.04", "windows-2022", "macos-latest"]
        .into_iter()
        .map(|os| JobContext {
            job: job(vec![racing_step()]),
            instance: JobInstance::new("tests", os),
            coverage_file: None,
        })
        .collect();

    let handles: Vec<_> = contexts
        .into_iter()
        .map(|ctx| {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(&ctx).await.unwrap().status })
        })
        .collect();

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }
    statuses
}

#[tokio::test]
async fn test_successful_steps() {
    let workspace = TempDir::new().unwrap();
    let ctx = context(
        job(vec![
            StepDefinition::new("install", "echo installing > install.log"),
            StepDefinition::new("test", "test -f install.log"),
        ]),
        None,
    );

    let result = runner(&workspace).run(&ctx).await.unwrap();
    assert_eq!(result.status, JobStatus::Success);
    assert!(result.coverage_report.is_none());
}

#[tokio::test]
async fn test_first_failing_step_stops_the_job() {
    let workspace = TempDir::new().unwrap();
    let ctx = context(
        job(vec![
            StepDefinition::new("lint", "exit 3"),
            StepDefinition::new("never", "touch never-ran"),
        ]),
        None,
    );

    let runner = runner(&workspace);
    let result = runner.run(&ctx).await.unwrap();
    assert_eq!(result.status, JobStatus::Failure);
    assert_eq!(
        result.message.as_deref(),
        Some("step `lint` exited with code 3")
    );
    assert!(!instance_dir(&runner, &ctx).join("never-ran").exists());
}

#[tokio::test]
async fn test_continue_on_error() {
    let workspace = TempDir::new().unwrap();
    let mut flaky = StepDefinition::new("flaky", "false");
    flaky.continue_on_error = true;
    let ctx = context(
        job(vec![flaky, StepDefinition::new("after", "touch after-ran")]),
        None,
    );

    let runner = runner(&workspace);
    let result = runner.run(&ctx).await.unwrap();
    assert_eq!(result.status, JobStatus::Success);
    assert!(instance_dir(&runner, &ctx).join("after-ran").exists());
}

#[tokio::test]
async fn test_matrix_values_reach_the_step() {
    let workspace = TempDir::new().unwrap();
    let ctx = context(
        job(vec![StepDefinition::new(
            "record",
            "echo \"${{ matrix.env_file }} $GANTRY_MATRIX_ENV_FILE $GANTRY_OS $GANTRY_JOB\" > values.txt",
        )]),
        None,
    );

    let runner = runner(&workspace);
    runner.run(&ctx).await.unwrap();
    let values = std::fs::read_to_string(instance_dir(&runner, &ctx).join("values.txt")).unwrap();
    assert_eq!(
        values.trim(),
        "environment_no_cuda.yml environment_no_cuda.yml ubuntu-22.04 tests"
    );
}

#[tokio::test]
async fn test_working_directory_and_step_env() {
    let workspace = TempDir::new().unwrap();
    std::fs::create_dir(workspace.path().join("sub")).unwrap();
    let mut step = StepDefinition::new("record", "echo \"$GREETING\" > greeting.txt");
    step.working_directory = Some("sub".to_string());
    step.env
        .insert("GREETING".to_string(), "hi ${{ matrix.os }}".to_string());

    let runner = runner(&workspace);
    let ctx = context(job(vec![step]), None);
    runner.run(&ctx).await.unwrap();

    let greeting =
        std::fs::read_to_string(instance_dir(&runner, &ctx).join("sub").join("greeting.txt"))
            .unwrap();
    assert_eq!(greeting.trim(), "hi ubuntu-22.04");
    assert!(!workspace.path().join("sub").join("greeting.txt").exists());
}

#[tokio::test]
async fn test_instance_runs_in_a_copy_of_the_workspace() {
    let workspace = TempDir::new().unwrap();
    std::fs::create_dir_all(workspace.path().join("sleap/io")).unwrap();
    std::fs::write(workspace.path().join("sleap/io/video.py"), "pass\n").unwrap();
    std::fs::write(workspace.path().join("environment.yml"), "name: sleap\n").unwrap();

    let ctx = context(
        job(vec![StepDefinition::new(
            "check",
            "test -f sleap/io/video.py && test -f environment.yml && test -d \"$GANTRY_WORKSPACE\"",
        )]),
        None,
    );
    let result = runner(&workspace).run(&ctx).await.unwrap();
    assert_eq!(result.status, JobStatus::Success);
}

#[tokio::test]
async fn test_leftover_instance_files_are_discarded() {
    let workspace = TempDir::new().unwrap();
    let runner = runner(&workspace);
    let first = context(job(vec![StepDefinition::new("write", "touch leftover")]), None);
    runner.run(&first).await.unwrap();

    let second = context(job(vec![StepDefinition::new("check", "test ! -e leftover")]), None);
    let result = runner.run(&second).await.unwrap();
    assert_eq!(result.status, JobStatus::Success);
}

#[tokio::test]
async fn test_concurrent_instances_do_not_share_files() {
    let workspace = TempDir::new().unwrap();
    let statuses = run_siblings(runner(&workspace)).await;
    assert_eq!(statuses, vec![JobStatus::Success; 3]);
}

#[tokio::test]
async fn test_shared_workspace_runs_instances_one_at_a_time() {
    let workspace = TempDir::new().unwrap();
    let runner = ShellJobRunner::new(RunnerConfig {
        workspace: workspace.path().to_path_buf(),
        isolation: WorkspaceIsolation::Shared,
        ..Default::default()
    });
    let statuses = run_siblings(runner).await;
    assert_eq!(statuses, vec![JobStatus::Success; 3]);
    assert!(workspace.path().join("state.txt").exists());
}

#[tokio::test]
async fn test_collects_coverage_file() {
    let workspace = TempDir::new().unwrap();
    let ctx = context(
        job(vec![StepDefinition::new(
            "test",
            "echo '<coverage line-rate=\"0.8\"/>' > coverage.xml",
        )]),
        Some("coverage.xml"),
    );

    let result = runner(&workspace).run(&ctx).await.unwrap();
    let report = result.coverage_report.unwrap();
    assert_eq!(report.file, "coverage.xml");
    assert!(report.content.contains("line-rate"));
    assert_eq!(report.upload, UploadStatus::NotAttempted);
}

#[tokio::test]
async fn test_missing_coverage_file_is_not_an_error() {
    let workspace = TempDir::new().unwrap();
    let ctx = context(
        job(vec![StepDefinition::new("test", "true")]),
        Some("coverage.xml"),
    );

    let result = runner(&workspace).run(&ctx).await.unwrap();
    assert_eq!(result.status, JobStatus::Success);
    assert!(result.coverage_report.is_none());
}

#[tokio::test]
async fn test_stale_coverage_file_is_not_reported() {
    let workspace = TempDir::new().unwrap();
    std::fs::write(workspace.path().join("coverage.xml"), "<coverage line-rate=\"0.9\"/>")
        .unwrap();
    let ctx = context(
        job(vec![StepDefinition::new("test", "true")]),
        Some("coverage.xml"),
    );

    let runner = runner(&workspace);
    let result = runner.run(&ctx).await.unwrap();
    assert_eq!(result.status, JobStatus::Success);
    assert!(result.coverage_report.is_none());
    assert!(!instance_dir(&runner, &ctx).join("coverage.xml").exists());
}

#[tokio::test]
async fn test_stale_coverage_file_is_removed_in_shared_workspace() {
    let workspace = TempDir::new().unwrap();
    std::fs::write(workspace.path().join("coverage.xml"), "<coverage/>").unwrap();
    let runner = ShellJobRunner::new(RunnerConfig {
        workspace: workspace.path().to_path_buf(),
        isolation: WorkspaceIsolation::Shared,
        ..Default::default()
    });

    let result = runner
        .run(&context(
            job(vec![StepDefinition::new("test", "true")]),
            Some("coverage.xml"),
        ))
        .await
        .unwrap();
    assert!(result.coverage_report.is_none());
    assert!(!workspace.path().join("coverage.xml").exists());
}

#[tokio::test]
async fn test_step_timeout_fails_the_job() {
    let workspace = TempDir::new().unwrap();
    let runner = ShellJobRunner::new(RunnerConfig {
        workspace: workspace.path().to_path_buf(),
        step_timeout_seconds: Some(1),
        ..Default::default()
    });
    let ctx = context(
        job(vec![
            StepDefinition::new("slow", "sleep 5"),
            StepDefinition::new("after", "touch after-ran"),
        ]),
        None,
    );

    let result = runner.run(&ctx).await.unwrap();
    assert_eq!(result.status, JobStatus::Failure);
    assert_eq!(
        result.message.as_deref(),
        Some("Step `slow` timed out after 1s")
    );
    assert!(!instance_dir(&runner, &ctx).join("after-ran").exists());
}

#[tokio::test]
async fn test_step_timeout_with_continue_on_error() {
    let workspace = TempDir::new().unwrap();
    let runner = ShellJobRunner::new(RunnerConfig {
        workspace: workspace.path().to_path_buf(),
        step_timeout_seconds: Some(1),
        ..Default::default()
    });
    let mut slow = StepDefinition::new("slow", "sleep 5");
    slow.continue_on_error = true;
    let ctx = context(
        job(vec![slow, StepDefinition::new("after", "touch after-ran")]),
        None,
    );

    let result = runner.run(&ctx).await.unwrap();
    assert_eq!(result.status, JobStatus::Success);
    assert!(instance_dir(&runner, &ctx).join("after-ran").exists());
}

#[tokio::test]
async fn test_unknown_shell_is_an_error() {
    let workspace = TempDir::new().unwrap();
    let mut step = StepDefinition::new("test", "true");
    step.shell = Some("definitely-not-a-shell-binary".to_string());

    let err = runner(&workspace)
        .run(&context(job(vec![step]), None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to spawn"));
}

#[tokio::test]
async fn test_directory_uploader_writes_report() {
    let target = TempDir::new().unwrap();
    let uploader = DirectoryUploader::new(target.path().join("coverage"));
    let instance = JobInstance::new("tests", "ubuntu-22.04");
    let report = gantry_core::job::CoverageReport::new("coverage.xml", "<coverage/>");

    let status = uploader.upload(&instance, &report).await.unwrap();
    let written = target
        .path()
        .join("coverage")
        .join("tests-ubuntu-22.04-coverage.xml");
    assert_eq!(
        status,
        UploadStatus::Uploaded {
            location: written.display().to_string()
        }
    );
    assert_eq!(std::fs::read_to_string(written).unwrap(), "<coverage/>");
}

#[tokio::test]
async fn test_directory_uploader_rejects_empty_report() {
    let target = TempDir::new().unwrap();
    let uploader = DirectoryUploader::new(target.path());
    let report = gantry_core::job::CoverageReport::new("coverage.xml", "");

    assert!(
        uploader
            .upload(&JobInstance::new("tests", "ubuntu-22.04"), &report)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_noop_uploader() {
    let report = gantry_core::job::CoverageReport::new("coverage.xml", "<coverage/>");
    let status = NoopUploader
        .upload(&JobInstance::new("tests", "ubuntu-22.04"), &report)
        .await
        .unwrap();
    assert_eq!(status, UploadStatus::NotAttempted);
}
