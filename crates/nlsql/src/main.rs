use anyhow::Result;
use clap::Parser;
use nlsql::args::Cli;
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logutil::configure_stderr_logger(cli.logging.log_level, cli.logging.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "starting...");

    cli.command.run()
}
