use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod scenario;

use signon_mock_core::{BrokerConfig, RedactedLoggerBuilder};

#[derive(Parser)]
#[command(name = "signon-mock")]
#[command(about = "Mock single-sign-on broker for driving and checking sign-on clients")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file against a fresh broker
    Run(commands::run::RunArgs),

    /// Print the effective broker configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let config = BrokerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, config).await,
        Commands::Config(args) => commands::config::execute(args, &config),
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    RedactedLoggerBuilder::new(level)
        .include_target(false)
        .init()?;

    Ok(())
}
