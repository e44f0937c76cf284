#![warn(missing_docs)]

//! Entry point for the `settingsctl` binary.

mod cli;
mod error;
mod file;
mod schema;

use std::process;

use clap::Parser;
use settings_engine::Value;
use tracing::{debug, error};

use crate::{
    cli::{Cli, Commands},
    error::Result,
};

fn main() {
    if let Err(err) = run() {
        error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

/// Parse CLI arguments, install logging, and dispatch to the chosen subcommand.
fn run() -> Result<()> {
    let Cli { log, command } = Cli::parse();
    let log_spec = logging::init(&log);
    debug!(spec = %log_spec, "logging initialised");

    match command {
        Commands::File(cmd) => file::run(cmd),
        Commands::Schema(args) => schema::run(args),
    }
}

/// Interpret a command-line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
