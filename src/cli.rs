use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use sur_lua::ExecutionLimits;

use crate::harness::HarnessOptions;

#[derive(Parser, Debug)]
#[command(name = "sur", author, version, about = "Sublet test harness")]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load sublets and invoke their capabilities from a menu.
    Test(TestArgs),
}

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Sublet scripts, tested one after another.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Print each sublet's attributes and capabilities once without prompting.
    #[arg(long)]
    pub list: bool,

    /// Wall-clock limit per script execution in milliseconds, 0 to disable.
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,
}

impl TestArgs {
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits::with_timeout(Duration::from_millis(self.timeout_ms))
    }

    pub fn options(&self) -> HarnessOptions {
        HarnessOptions {
            limits: self.limits(),
            list_only: self.list,
        }
    }
}
