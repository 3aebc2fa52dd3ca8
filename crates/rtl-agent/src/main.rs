use anyhow::Result;
use clap::{Parser, Subcommand};
use rtl_agent::AgentConfig;
use std::path::PathBuf;
use tracing::{error, info};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate and refine the RTL module for a benchmark workspace
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Workspace holding prompt.json, docs/, rtl/, verif/ and rundir/ (overrides RTL_AGENT_CODE_DIR)
    #[arg(long)]
    code_dir: Option<PathBuf>,

    /// TOML config file layered over the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Main refinement iterations (overrides RTL_AGENT_MAX_ITERATIONS)
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Skip port usage analysis and port refinement
    #[arg(long, default_value_t = false)]
    no_port_validation: bool,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Where to write the verdict JSON (default: <code-dir>/rundir/verdict.json)
    #[arg(long)]
    verdict_out: Option<PathBuf>,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(args: &RunArgs) -> Result<AgentConfig> {
    let mut config = AgentConfig::load(args.config.as_deref())?;
    if let Some(dir) = &args.code_dir {
        config.code_dir = dir.clone();
    }
    if let Some(max) = args.max_iterations {
        config.refinement.max_iterations = max;
    }
    if args.no_port_validation {
        config.refinement.enable_port_validation = false;
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    info!(
        code_dir = %config.code_dir.display(),
        url = %config.endpoint.url,
        model = %config.endpoint.model,
        max_iterations = config.refinement.max_iterations,
        port_validation = config.refinement.enable_port_validation,
        "RTL agent starting"
    );

    let report = rtl_agent::run(&config).await?;
    let out = args
        .verdict_out
        .unwrap_or_else(|| config.rundir().join("verdict.json"));
    report.write_json(&out)?;
    info!(
        outcome = ?report.verdict.outcome,
        iterations = report.verdict.iterations,
        verdict = %out.display(),
        "RTL agent finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            init_tracing(args.json_logs);
            // The benchmark harness treats any non-zero exit as a crash.
            if let Err(e) = run(args).await {
                error!(error = %format!("{e:#}"), "RTL agent run failed");
            }
        }
    }
}
