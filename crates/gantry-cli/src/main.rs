//! Gantry CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;
mod handlers;
mod logging;

use commands::{Commands, ConfigCommands, LogFormat};
use config::{CliConfig, OutputFormat};
use handlers::RunOptions;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(author, version, about = "CI trigger, matrix and verdict policy", long_about = None)]
struct Cli {
    /// Workflow file (defaults to the configured path, then ./gantry.yml)
    #[arg(long, global = true)]
    workflow: Option<PathBuf>,

    /// Output format (defaults to the configured format)
    #[arg(short, long, global = true, value_enum)]
    output: Option<OutputFormat>,

    /// Log format written to stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_format);

    let config = CliConfig::load().unwrap_or_default();
    let format = cli.output.unwrap_or(config.output_format);
    let workflow_path = cli.workflow.as_deref();

    match cli.command {
        Commands::Init { path, force } => handlers::init(&path, force)?,
        Commands::Validate { path } => {
            handlers::validate(path.or_else(|| cli.workflow.clone()), &config)?
        }
        Commands::Schema => handlers::schema()?,
        Commands::Trigger { event } => {
            let workflow = handlers::load_workflow(workflow_path, &config)?;
            handlers::trigger(&workflow, &event, format)?
        }
        Commands::Expand { job } => {
            let workflow = handlers::load_workflow(workflow_path, &config)?;
            handlers::expand(&workflow, job.as_deref(), format)?
        }
        Commands::Aggregate { results, partial } => {
            let workflow = handlers::load_workflow(workflow_path, &config)?;
            return handlers::aggregate(&workflow, &results, partial, format);
        }
        Commands::Run {
            event,
            workspace,
            coverage_dir,
            max_parallel,
            shared_workspace,
        } => {
            let workflow = handlers::load_workflow(workflow_path, &config)?;
            let options = RunOptions {
                event,
                workspace,
                coverage_dir,
                max_parallel,
                shared_workspace,
            };
            return handlers::run(workflow, &config, options, format).await;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }

    Ok(ExitCode::SUCCESS)
}
