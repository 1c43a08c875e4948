//! Workflow definition types.
//!
//! These types represent the user-authored workflow YAML: triggers, jobs
//! with an optional OS matrix, step commands and the coverage gate.

use crate::event::PullRequestAction;
use crate::glob::{Glob, compile_all};
use crate::ids::Os;
use crate::job::{JobInstance, JobSpec, Overrides};
use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Workflow {
    pub name: String,
    pub triggers: TriggerConfig,
    pub jobs: Vec<JobDefinition>,
    #[serde(default)]
    pub coverage: Option<CoverageConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TriggerConfig {
    #[serde(default)]
    pub pull_request: Option<PullRequestTrigger>,
    #[serde(default)]
    pub push: Option<PushTrigger>,
    #[serde(default)]
    pub paths: Vec<Glob>,
    #[serde(default)]
    pub paths_ignore: Vec<Glob>,
}

impl TriggerConfig {
    pub fn path_filter(&self) -> PathFilter {
        PathFilter {
            patterns: self.paths.clone(),
            ignore: self.paths_ignore.clone(),
        }
    }

    pub fn tracked_branches(&self) -> &[Glob] {
        match &self.push {
            Some(push) => &push.branches,
            None => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PullRequestTrigger {
    #[serde(default = "PullRequestAction::defaults")]
    pub types: Vec<PullRequestAction>,
}

impl Default for PullRequestTrigger {
    fn default() -> Self {
        Self {
            types: PullRequestAction::defaults(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PushTrigger {
    pub branches: Vec<Glob>,
}

/// Watched path set. A set of changed paths matches when at least one path
/// matches at least one pattern and no ignore pattern.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PathFilter {
    pub patterns: Vec<Glob>,
    #[serde(default)]
    pub ignore: Vec<Glob>,
}

impl PathFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            patterns: compile_all(patterns)?,
            ignore: Vec::new(),
        })
    }

    pub fn with_ignore<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore = compile_all(patterns)?;
        Ok(self)
    }

    pub fn matches_path(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(path))
            && !self.ignore.iter().any(|p| p.is_match(path))
    }

    pub fn matches<S: AsRef<str>>(&self, changed_paths: &[S]) -> bool {
        changed_paths.iter().any(|p| self.matches_path(p.as_ref()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// OS for jobs without a matrix.
    #[serde(default)]
    pub runs_on: Option<Os>,
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub steps: Vec<StepDefinition>,
}

impl JobDefinition {
    /// The matrix template of this job. A job without a matrix has a single
    /// axis value, its `runs_on` OS, and no overrides.
    pub fn spec(&self) -> Result<JobSpec> {
        if let Some(matrix) = &self.matrix {
            return Ok(JobSpec {
                name: self.name.clone(),
                axis_values: matrix.os.clone(),
                default_overrides: matrix.defaults.clone(),
                per_axis_overrides: matrix.overrides.clone(),
            });
        }

        let os = self.runs_on.clone().ok_or_else(|| {
            Error::InvalidWorkflow(format!(
                "job `{}` needs either `runs_on` or a `matrix`",
                self.name
            ))
        })?;

        Ok(JobSpec {
            name: self.name.clone(),
            axis_values: vec![os],
            default_overrides: Overrides::new(),
            per_axis_overrides: BTreeMap::new(),
        })
    }

    pub fn max_parallel(&self) -> Option<usize> {
        self.matrix.as_ref().and_then(|m| m.max_parallel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatrixConfig {
    pub os: Vec<Os>,
    #[serde(default)]
    pub defaults: Overrides,
    #[serde(default)]
    pub overrides: BTreeMap<Os, Overrides>,
    #[serde(default)]
    pub max_parallel: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepDefinition {
    pub name: String,
    pub run: String,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run: run.into(),
            shell: None,
            working_directory: None,
            env: BTreeMap::new(),
            timeout_minutes: None,
            continue_on_error: false,
        }
    }
}

/// Which instance must produce a coverage report, and how strictly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CoverageConfig {
    /// Restrict the requirement to one job. When absent every instance on
    /// `os` must carry coverage.
    #[serde(default)]
    pub job: Option<String>,
    pub os: Os,
    #[serde(default = "default_coverage_file")]
    pub file: String,
    #[serde(default = "default_fail_on_error")]
    pub fail_on_error: bool,
}

fn default_coverage_file() -> String {
    "coverage.xml".to_string()
}

fn default_fail_on_error() -> bool {
    true
}

impl CoverageConfig {
    pub fn new(os: impl Into<Os>, fail_on_error: bool) -> Self {
        Self {
            job: None,
            os: os.into(),
            file: default_coverage_file(),
            fail_on_error,
        }
    }

    pub fn for_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Whether `instance` is expected to carry the coverage report.
    pub fn applies_to(&self, instance: &JobInstance) -> bool {
        instance.os == self.os && self.job.as_ref().is_none_or(|job| *job == instance.job)
    }
}

impl Workflow {
    /// Parse and validate a workflow from YAML.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let workflow: Workflow = serde_yaml::from_str(content)?;
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn job(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Check structural invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidWorkflow(msg));

        if self.triggers.pull_request.is_none() && self.triggers.push.is_none() {
            return invalid("workflow declares no pull_request or push trigger".to_string());
        }
        if self.jobs.is_empty() {
            return invalid("workflow declares no jobs".to_string());
        }

        let mut names = HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                return invalid(format!("duplicate job name `{}`", job.name));
            }
            if job.steps.is_empty() {
                return invalid(format!("job `{}` has no steps", job.name));
            }
            if let Some(matrix) = &job.matrix {
                Self::validate_matrix(&job.name, matrix)?;
            }
            job.spec()?;
        }

        if let Some(coverage) = &self.coverage {
            self.validate_coverage(coverage)?;
        }

        Ok(())
    }

    fn validate_matrix(job: &str, matrix: &MatrixConfig) -> Result<()> {
        if matrix.os.is_empty() {
            return Err(Error::InvalidWorkflow(format!(
                "job `{}` has an empty os matrix",
                job
            )));
        }

        let mut seen = HashSet::new();
        for os in &matrix.os {
            if !seen.insert(os) {
                return Err(Error::InvalidWorkflow(format!(
                    "job `{}` lists os `{}` more than once",
                    job, os
                )));
            }
        }

        if let Some(os) = matrix.overrides.keys().find(|os| !seen.contains(os)) {
            return Err(Error::InvalidWorkflow(format!(
                "job `{}` overrides os `{}` which is not in its matrix",
                job, os
            )));
        }

        if matrix.max_parallel == Some(0) {
            return Err(Error::InvalidWorkflow(format!(
                "job `{}` sets max_parallel to 0",
                job
            )));
        }

        Ok(())
    }

    fn validate_coverage(&self, coverage: &CoverageConfig) -> Result<()> {
        let candidates: Vec<&JobDefinition> = match &coverage.job {
            Some(name) => vec![self.job(name).ok_or_else(|| {
                Error::InvalidWorkflow(format!("coverage names unknown job `{}`", name))
            })?],
            None => self.jobs.iter().collect(),
        };

        for job in candidates {
            if job.spec()?.axis_values.contains(&coverage.os) {
                return Ok(());
            }
        }

        Err(Error::InvalidWorkflow(format!(
            "no job instance runs on coverage os `{}`",
            coverage.os
        )))
    }

    /// The built-in CI workflow: type checking, linting and a three-OS test
    /// matrix with coverage collected on Ubuntu.
    pub fn default_ci() -> Self {
        let globs = |patterns: &[&str]| -> Vec<Glob> {
            patterns
                .iter()
                .filter_map(|p| Glob::new(*p).ok())
                .collect()
        };
        let overrides = |pairs: &[(&str, &str)]| -> Overrides {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        let ubuntu = Os::new("ubuntu-22.04");

        let triggers = TriggerConfig {
            pull_request: Some(PullRequestTrigger::default()),
            push: Some(PushTrigger {
                branches: globs(&["master", "develop"]),
            }),
            paths: globs(&["sleap/**", "tests/**", "*.yml", "requirements*.txt"]),
            paths_ignore: Vec::new(),
        };

        let type_check = JobDefinition {
            name: "type_check".to_string(),
            display_name: Some("Type Check".to_string()),
            runs_on: Some(ubuntu.clone()),
            matrix: None,
            env: BTreeMap::new(),
            steps: vec![
                StepDefinition::new("install", "pip install mypy"),
                StepDefinition::new(
                    "mypy",
                    "mypy --follow-imports=skip --ignore-missing-imports sleap tests",
                ),
            ],
        };

        let lint = JobDefinition {
            name: "lint".to_string(),
            display_name: Some("Lint".to_string()),
            runs_on: Some(ubuntu.clone()),
            matrix: None,
            env: BTreeMap::new(),
            steps: vec![
                StepDefinition::new("install", "pip install black==22.3.0"),
                StepDefinition::new("black", "black --check sleap tests"),
            ],
        };

        let mut per_os = BTreeMap::new();
        per_os.insert(
            Os::new("macos-latest"),
            overrides(&[("env_file", "environment_mac.yml")]),
        );
        per_os.insert(
            ubuntu.clone(),
            overrides(&[(
                "test_args",
                "--cov=sleap --cov-report=xml --durations=-1 tests/",
            )]),
        );

        let tests = JobDefinition {
            name: "tests".to_string(),
            display_name: Some("Tests".to_string()),
            runs_on: None,
            matrix: Some(MatrixConfig {
                os: vec![
                    ubuntu.clone(),
                    Os::new("windows-2022"),
                    Os::new("macos-latest"),
                ],
                defaults: overrides(&[
                    ("env_file", "environment_no_cuda.yml"),
                    ("test_args", "--durations=-1 tests/"),
                ]),
                overrides: per_os,
                max_parallel: None,
            }),
            env: BTreeMap::new(),
            steps: vec![
                StepDefinition::new(
                    "install",
                    "conda env create --name sleap_ci_${{ matrix.os }} --file ${{ matrix.env_file }}",
                ),
                StepDefinition::new(
                    "test",
                    "conda run --name sleap_ci_${{ matrix.os }} pytest ${{ matrix.test_args }}",
                ),
            ],
        };

        Workflow {
            name: "CI".to_string(),
            triggers,
            jobs: vec![type_check, lint, tests],
            coverage: Some(CoverageConfig::new(ubuntu, true).for_job("tests")),
        }
    }
}
