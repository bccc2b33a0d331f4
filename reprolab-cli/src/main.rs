mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reprolab")]
#[command(about = "Run, validate and estimate generated simulation scripts under resource limits")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (default: ~/.config/reprolab/sandbox.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a script under timeout and resource limits
    Run {
        /// Path to the Python script
        script: PathBuf,

        /// Stage identifier used to name the script file
        #[arg(short, long)]
        stage_id: String,

        /// Output directory (default: a fresh temporary directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Wall-clock timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Address-space limit in GB
        #[arg(long)]
        memory_gb: Option<f64>,

        /// Thread count for numeric libraries
        #[arg(long)]
        cpu_cores: Option<u32>,

        /// Delete the script file after the run
        #[arg(long)]
        no_keep_script: bool,

        /// Extra environment variable for the script (KEY=VALUE, repeatable)
        #[arg(short, long = "env", value_parser = commands::parse_key_val)]
        env: Vec<(String, String)>,
    },
    /// Statically scan a script for dangerous or blocking code
    Validate {
        /// Path to the Python script
        script: PathBuf,
    },
    /// Estimate a script's runtime and a safe timeout
    Estimate {
        /// Path to the Python script
        script: PathBuf,

        /// Design-stage estimate in minutes (default: 5)
        #[arg(short, long)]
        minutes: Option<f64>,
    },
    /// Show what the host can enforce
    Platform,
    /// Run the code-runner node on a workflow state read from a JSON file
    Node {
        /// Path to the JSON state
        state: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "reprolab=debug,reprolab_sandbox=debug"
    } else {
        "reprolab=info,reprolab_sandbox=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.config.as_deref();
    let exit_code = match cli.command {
        Commands::Run {
            script,
            stage_id,
            output_dir,
            timeout,
            memory_gb,
            cpu_cores,
            no_keep_script,
            env,
        } => {
            let overrides = commands::RunOverrides {
                timeout,
                memory_gb,
                cpu_cores,
                keep_script: !no_keep_script,
                env,
            };
            commands::execute_run(config, &script, &stage_id, output_dir.as_deref(), overrides)
                .await?
        }
        Commands::Validate { script } => commands::execute_validate(config, &script)?,
        Commands::Estimate { script, minutes } => commands::execute_estimate(&script, minutes)?,
        Commands::Platform => commands::execute_platform()?,
        Commands::Node { state } => commands::execute_node(config, &state).await?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
