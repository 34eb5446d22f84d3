//! # hatch
//!
//! Runs a single command inside a throwaway root populated from a registry
//! image, in its own PID namespace, and exits with the command's status.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use hatch_common::constants::LAUNCHER_FAILURE_EXIT;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> ExitCode {
    // Logs share stderr with the command's relayed stderr; stdout stays untouched.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::execute(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            output::report_error(&err);
            ExitCode::from(LAUNCHER_FAILURE_EXIT)
        }
    }
}
