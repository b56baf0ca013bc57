use std::io;

use anyhow::Result;
use clap::Parser;
use sur::cli::{Cli, Command};
use sur::harness::Harness;
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    sur::logging::init(&cli.log_level)?;

    info!("Starting sur v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Test(args) => {
            let harness = Harness::new(args.options());
            let stdin = io::stdin();
            let stdout = io::stdout();
            harness.run(&args.paths, &mut stdin.lock(), &mut stdout.lock())?;
        }
    }

    Ok(())
}
