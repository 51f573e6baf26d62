//! webrec CLI - Command-line interface
//!
//! Runs the recording server and works with recordings on disk.

mod commands;

use clap::Parser;
use webrec_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "webrec")]
#[command(about = "Records live WebM uploads into seekable files")]
struct Cli {
    /// Console log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), None)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    commands::handle_command(cli.command).await
}
