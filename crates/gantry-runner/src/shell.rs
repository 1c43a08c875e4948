//! Shell-based job execution on the host.

use async_trait::async_trait;
use gantry_core::interpolation::InterpolationContext;
use gantry_core::job::{CoverageReport, JobInstance, JobResult};
use gantry_core::ports::{JobContext, JobRunner};
use gantry_core::workflow::StepDefinition;
use gantry_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

/// Directory under the workspace that holds per-instance copies.
pub const WORK_DIR: &str = ".gantry";

/// Where the steps of a job instance run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkspaceIsolation {
    /// Each instance runs in a fresh copy of the workspace under `.gantry/`.
    #[default]
    PerInstance,
    /// Instances run in the workspace itself, one at a time.
    Shared,
}

/// Configuration for host execution.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Source tree the steps run against.
    pub workspace: PathBuf,
    /// Shell used when a step names none. Defaults to `sh` (`cmd` on Windows).
    pub shell: Option<String>,
    /// Timeout for steps that declare none.
    pub step_timeout_seconds: Option<u64>,
    /// Pass the runner's own environment through to steps.
    pub inherit_env: bool,
    pub isolation: WorkspaceIsolation,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            shell: None,
            step_timeout_seconds: None,
            inherit_env: true,
            isolation: WorkspaceIsolation::default(),
        }
    }
}

impl RunnerConfig {
    /// Directory the steps of `instance` run in and coverage is read from.
    pub fn instance_dir(&self, instance: &JobInstance) -> PathBuf {
        match self.isolation {
            WorkspaceIsolation::Shared => self.workspace.clone(),
            WorkspaceIsolation::PerInstance => self
                .workspace
                .join(WORK_DIR)
                .join(dir_name(&format!("{}-{}", instance.job, instance.os))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Exited(i32),
    TimedOut(u64),
}

/// Runs job steps sequentially through the host shell.
pub struct ShellJobRunner {
    config: RunnerConfig,
    shared: Mutex<()>,
}

impl ShellJobRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            shared: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    async fn prepare_workspace(&self, instance: &JobInstance) -> Result<PathBuf> {
        let dir = self.config.instance_dir(instance);
        if self.config.isolation == WorkspaceIsolation::Shared {
            return Ok(dir);
        }

        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        let source = self.config.workspace.clone();
        let target = dir.clone();
        tokio::task::spawn_blocking(move || copy_tree(&source, &target))
            .await
            .map_err(|e| Error::Internal(format!("Workspace copy failed: {}", e)))??;

        debug!(instance = %instance.display_name(), dir = %dir.display(), "Prepared instance workspace");
        Ok(dir)
    }

    fn shell_command(&self, step: &StepDefinition, script: &str) -> Command {
        let shell = step
            .shell
            .as_deref()
            .or(self.config.shell.as_deref())
            .unwrap_or(if cfg!(windows) { "cmd" } else { "sh" });

        let flag = match shell {
            "cmd" | "cmd.exe" => "/C",
            "pwsh" | "powershell" | "powershell.exe" => "-Command",
            _ => "-c",
        };

        let mut command = Command::new(shell);
        command.arg(flag).arg(script);
        command
    }

    fn environment(
        &self,
        ctx: &JobContext,
        step: &StepDefinition,
        interp: &InterpolationContext,
        root: &Path,
    ) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("GANTRY_WORKSPACE".to_string(), root.display().to_string());
        env.insert("GANTRY_JOB".to_string(), ctx.instance.job.clone());
        env.insert("GANTRY_OS".to_string(), ctx.instance.os.to_string());
        for (key, value) in &ctx.instance.resolved_overrides {
            env.insert(format!("GANTRY_MATRIX_{}", env_key(key)), value.clone());
        }
        for (key, value) in ctx.job.env.iter().chain(step.env.iter()) {
            env.insert(key.clone(), interp.interpolate(value));
        }
        env
    }

    async fn run_step(
        &self,
        ctx: &JobContext,
        step: &StepDefinition,
        interp: &InterpolationContext,
        root: &Path,
    ) -> Result<StepOutcome> {
        let script = interp.clone().with_env(&step.env).interpolate(&step.run);
        let workdir = match &step.working_directory {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };

        info!(step = %step.name, command = %script, workdir = %workdir.display(), "Executing step");

        let mut command = self.shell_command(step, &script);
        if !self.config.inherit_env {
            command.env_clear();
        }
        command
            .envs(self.environment(ctx, step, interp, root))
            .current_dir(&workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Internal(format!("Failed to spawn `{}`: {}", step.name, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("stderr was not captured".to_string()))?;
        let stdout_handle = tokio::spawn(pump(stdout, step.name.clone(), "stdout"));
        let stderr_handle = tokio::spawn(pump(stderr, step.name.clone(), "stderr"));

        let limit = step
            .timeout_minutes
            .map(|minutes| u64::from(minutes) * 60)
            .or(self.config.step_timeout_seconds);
        let status = match limit {
            Some(seconds) => match timeout(Duration::from_secs(seconds), child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(step = %step.name, seconds, "Step timed out, killing process");
                    let _ = child.kill().await;
                    let _ = stdout_handle.await;
                    let _ = stderr_handle.await;
                    return Ok(StepOutcome::TimedOut(seconds));
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| Error::Internal(format!("Failed to wait for `{}`: {}", step.name, e)))?;

        let _ = stdout_handle.await;
        let _ = stderr_handle.await;

        Ok(StepOutcome::Exited(status.code().unwrap_or(-1)))
    }

    async fn collect_coverage(&self, root: &Path, file: &str) -> Option<CoverageReport> {
        let path = root.join(file);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!(path = %path.display(), bytes = content.len(), "Collected coverage report");
                Some(CoverageReport::new(file, content))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Coverage report not found");
                None
            }
        }
    }
}

#[async_trait]
impl JobRunner for ShellJobRunner {
    async fn run(&self, ctx: &JobContext) -> Result<JobResult> {
        let start = Instant::now();
        let interp = InterpolationContext::for_instance(&ctx.instance).with_env(&ctx.job.env);
        let elapsed = || start.elapsed().as_millis() as u64;

        let _guard = match self.config.isolation {
            WorkspaceIsolation::Shared => Some(self.shared.lock().await),
            WorkspaceIsolation::PerInstance => None,
        };
        let root = self.prepare_workspace(&ctx.instance).await?;
        if let Some(file) = &ctx.coverage_file {
            remove_stale(&root.join(file)).await?;
        }

        for step in &ctx.job.steps {
            let failure = match self.run_step(ctx, step, &interp, &root).await? {
                StepOutcome::Exited(0) => continue,
                StepOutcome::Exited(code) => {
                    format!("step `{}` exited with code {}", step.name, code)
                }
                StepOutcome::TimedOut(seconds) => Error::StepTimeout {
                    step: step.name.clone(),
                    seconds,
                }
                .to_string(),
            };

            if step.continue_on_error {
                warn!(step = %step.name, %failure, "Step failed, continuing");
                continue;
            }
            return Ok(JobResult::failure(ctx.instance.clone(), failure).with_duration(elapsed()));
        }

        let mut result = JobResult::success(ctx.instance.clone());
        if let Some(file) = &ctx.coverage_file
            && let Some(report) = self.collect_coverage(&root, file).await
        {
            result = result.with_coverage(report);
        }
        Ok(result.with_duration(elapsed()))
    }
}

async fn pump<R: AsyncRead + Unpin>(reader: R, step: String, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(step = %step, stream, "{}", line);
    }
}

/// Coverage left behind by an earlier run must not count for this one.
async fn remove_stale(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale coverage report");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn copy_tree(source: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(target)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        if entry.file_name() == WORK_DIR {
            continue;
        }
        let from = entry.path();
        let to = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&from, &to)?;
        } else if from.is_file() {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

fn dir_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
