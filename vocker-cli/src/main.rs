mod cli;
mod commands;

use clap::Parser;
use vocker::runtime::layout::FilesystemLayout;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let options = cli.global.options()?;
    let logs_dir = FilesystemLayout::new(options.home_dir).logs_dir();
    let _log_guard = vocker::util::init_logging(&logs_dir, cli.global.log_level());

    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &cli.global).await,
        Commands::Export(args) => commands::export::execute(args, &cli.global).await,
        Commands::Images(args) => commands::images::execute(args, &cli.global).await,
    }
}
