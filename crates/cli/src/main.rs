// SPDX-License-Identifier: MIT

//! `quarry` — the extraction runtime CLI.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod cli;
mod commands;
mod config;
mod exit_error;
mod output;

use clap::Parser;
use cli::{Cli, Command};
use exit_error::ExitError;

fn init_logging() {
    // Stdout is command output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("QUARRY_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result: Result<(), ExitError> = match cli.command {
        Command::Run(args) => commands::run::execute(*args),
        Command::Inspect(args) => commands::inspect::execute(args).map_err(to_exit),
        Command::Stats(args) => commands::stats::execute(args).map_err(to_exit),
        Command::List(args) => commands::list::execute(args).map_err(to_exit),
        Command::Debug(args) => commands::debug::execute(args).map_err(to_exit),
        Command::Version => {
            println!("quarry {}", quarry_core::CONTRACT_VERSION);
            Ok(())
        }
    };

    if let Err(err) = result {
        if !err.message.is_empty() {
            eprintln!("error: {err}");
        }
        std::process::exit(err.code);
    }
}

fn to_exit(err: anyhow::Error) -> ExitError {
    ExitError::new(1, format!("{err:#}"))
}
