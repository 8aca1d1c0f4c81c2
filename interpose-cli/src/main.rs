//! `interpose`: validate interceptor configs and dry-run envelopes through
//! their chains without a transport.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod plugins;

#[derive(Parser)]
#[command(name = "interpose")]
#[command(about = "Validate and dry-run interceptor chains", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a config, report every problem, and summarize it
    Validate(commands::ValidateArgs),

    /// Run one envelope through a route's chain and print the outcome
    Test(commands::TestArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON only.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Validate(args) => commands::validate(args),
        Commands::Test(args) => commands::test(args).await,
    }
}
