mod backend;
mod capture;
mod config;
mod daemon;
mod error;
mod gesture;
mod icon;
mod matcher;
mod registry;
mod render;
mod thumbnail;
mod timer;
mod types;
mod watcher;
mod x11;

#[cfg(test)]
mod test_utils;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::config::ConfigStore;
use crate::daemon::run_daemon;

#[derive(Parser)]
#[command(name = "eve-preview")]
#[command(about = "Live thumbnail previews of EVE Online client windows")]
struct Cli {
    /// Config file to use instead of the XDG default
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eve_preview=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    if cli.print_config {
        let store = ConfigStore::load(cli.config);
        let json = serde_json::to_string_pretty(store.settings()).context("serialize config")?;
        println!("{json}");
        return Ok(());
    }

    run_daemon(cli.config)
}
