use clap::{Parser, Subcommand};

mod commands;

use commands::{PreflightArgs, RunArgs};

#[derive(Parser)]
#[command(name = "neutral-keeper")]
#[command(about = "Keeper for delta-neutral positions: scans, evaluates and rebalances", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one keeper pass over every position on a network
    Run(RunArgs),
    /// Check configuration, wallet and node connectivity without sending transactions
    Preflight(PreflightArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let result = match cli.command {
        Commands::Run(args) => commands::run_keeper(args).await,
        Commands::Preflight(args) => commands::run_preflight(args).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %format!("{e:#}"), "Keeper exited with error");
        std::process::exit(1);
    }
}
