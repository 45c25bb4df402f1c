use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

mod agent;
mod arbiter;
mod cleanup;
mod cli;
mod config;
mod context;
mod error;
mod memo;
mod pipeline;
mod progress;
mod prompt;
mod provider;
mod report;
mod runner;
mod sandbox;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // stdout carries only the report; RUST_LOG wins over --verbose
    let default_filter = if cli.verbose {
        "crossrev=debug"
    } else {
        "crossrev=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Returning (rather than exiting) lets the runtime drop any agent
    // processes still attached to aborted tasks.
    match cli.command {
        Commands::Run(args) => cli::run::execute(args).await,
        Commands::Clean(args) => cli::clean::execute(args).map(|()| ExitCode::SUCCESS),
        Commands::Schema => cli::schema::execute().map(|()| ExitCode::SUCCESS),
    }
}
