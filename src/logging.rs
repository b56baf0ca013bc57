//! Log setup for the `sur` binary.
//!
//! Logs go to stderr so they never mix with the menu on stdout. `RUST_LOG`
//! wins over `--log-level`. Records from `sur-lua`, which logs through the
//! `log` facade, are forwarded into tracing by the subscriber.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init(level: &str) -> Result<()> {
    let filter = filter(level)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init()
        .context("error installing log subscriber")?;

    Ok(())
}

/// `RUST_LOG` when it is set and valid, `level` otherwise.
fn filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env().or_else(|_| default_filter(level))
}

fn default_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'"))
}
