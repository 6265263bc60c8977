mod cli;
mod commands;
mod country;
mod dates;
mod error;
mod extract;
mod model;
mod normalize;
mod reconcile;
mod registry;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::error::ImportError;

fn main() {
    init_tracing();

    if let Err(err) = run() {
        if matches!(err.downcast_ref::<ImportError>(), Some(ImportError::Cancelled)) {
            warn!("import cancelled");
            std::process::exit(130);
        }

        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Import(args) => commands::import::run(args),
        Commands::Status(args) => commands::status::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
