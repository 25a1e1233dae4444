//! api-harness - BDD-driven API test harness
//!
//! Runs Gherkin features against an HTTP API and files every scenario's
//! reports into its own run directory.

mod bdd;
mod cli;
mod commands;

use clap::Parser;
use commands::Commands;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "api-harness", about = "API test harness with per-run reports")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: API_HARNESS_CONFIG or config/environments.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Target environment (default: ENVIRONMENT or dev)
    #[arg(long, global = true)]
    env: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = cli::dispatch(cli.config.as_deref(), cli.env.as_deref(), cli.command).await;
    std::process::exit(code);
}
