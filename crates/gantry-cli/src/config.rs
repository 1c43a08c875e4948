//! CLI configuration management.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CliConfig {
    /// Workflow file used when `--workflow` is not given.
    #[serde(default)]
    pub workflow_path: Option<PathBuf>,
    /// Directory steps run in.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    /// Directory coverage reports are uploaded to. Reports are not
    /// uploaded when unset.
    #[serde(default)]
    pub coverage_dir: Option<PathBuf>,
    /// Default concurrency per matrix job.
    #[serde(default)]
    pub max_parallel: Option<usize>,
    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("dev", "gantry", "gantry")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "workflow_path" => self.workflow_path = Some(PathBuf::from(value)),
            "workspace" => self.workspace = Some(PathBuf::from(value)),
            "coverage_dir" => self.coverage_dir = Some(PathBuf::from(value)),
            "max_parallel" => {
                let n: usize = value
                    .parse()
                    .map_err(|_| format!("Invalid max_parallel: {}", value))?;
                if n == 0 {
                    return Err("max_parallel must be at least 1".to_string());
                }
                self.max_parallel = Some(n);
            }
            "output_format" => {
                self.output_format = match value {
                    "table" => OutputFormat::Table,
                    "json" => OutputFormat::Json,
                    "yaml" => OutputFormat::Yaml,
                    _ => return Err(format!("Invalid output format: {}", value)),
                };
            }
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}
