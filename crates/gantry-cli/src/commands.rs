//! CLI command definitions.

use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Write the default CI workflow
    Init {
        /// Destination file
        #[arg(default_value = "gantry.yml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow file
        path: Option<PathBuf>,
    },

    /// Print the JSON schema of workflow files
    Schema,

    /// Decide whether an event triggers the workflow
    Trigger {
        /// Event JSON file
        #[arg(short, long)]
        event: PathBuf,
    },

    /// List the job instances the workflow expands to
    Expand {
        /// Only expand this job
        #[arg(short, long)]
        job: Option<String>,
    },

    /// Compute a verdict from recorded job results
    Aggregate {
        /// JSON file holding an array of job results
        results: PathBuf,

        /// Treat instances without a result as still running
        #[arg(long)]
        partial: bool,
    },

    /// Run the pipeline on this host
    Run {
        /// Event JSON file; without it the pipeline runs unconditionally
        #[arg(short, long)]
        event: Option<PathBuf>,

        /// Directory the steps run in
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Directory coverage reports are uploaded to
        #[arg(long)]
        coverage_dir: Option<PathBuf>,

        /// Default concurrency per matrix job
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Run every instance in the workspace itself, one at a time
        #[arg(long)]
        shared_workspace: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
