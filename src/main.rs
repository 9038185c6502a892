use anyhow::Result;
use clap::Parser;
use quorum::cli::{
    handle_captions_command, handle_ledger_command, handle_run_command, Cli, CliCommand,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("quorum {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Captions(args)) => handle_captions_command(args),
        Some(CliCommand::Ledger) => handle_ledger_command(),
        Some(CliCommand::Run) | None => handle_run_command().await,
    }
}
