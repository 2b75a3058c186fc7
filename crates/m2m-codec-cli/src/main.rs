// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

mod error;
mod framesizes;
mod info;
mod metrics;
mod negotiate;
mod profile;
mod run;
mod utils;
mod virt;

use clap::{Parser, Subcommand};
use error::result_to_exit_code;
use std::process::ExitCode;

/// M2M Codec CLI - capability inspection, format negotiation and virtual codec runs
#[derive(Parser)]
#[command(name = "m2m-codec")]
#[command(version)]
#[command(about = "M2M Codec CLI - capability inspection, format negotiation and virtual codec runs")]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (use RUST_LOG=trace for more)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output results in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the capabilities of a device profile
    Info(info::Args),

    /// Negotiate coded and decoded formats on a fresh context
    Negotiate(negotiate::Args),

    /// Show the frame size range of a coded format
    Framesizes(framesizes::Args),

    /// Push frames through a virtual codec and measure job latency
    Run(run::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Info(args) => info::execute(args, cli.json),
        Commands::Negotiate(args) => negotiate::execute(args, cli.json),
        Commands::Framesizes(args) => framesizes::execute(args, cli.json),
        Commands::Run(args) => run::execute(args, cli.json),
    };

    result_to_exit_code(result)
}

/// Initialize env_logger based on verbosity flags
fn init_logging(verbose: bool, quiet: bool) {
    let env = env_logger::Env::default();

    let env = if quiet {
        env.default_filter_or("error")
    } else if verbose {
        env.default_filter_or("debug")
    } else {
        env.default_filter_or("warn")
    };

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();

    log::debug!("Logging initialized");
}
