// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # Robosource CLI
//!
//! Command-line front end for MCAP playback sources.
//!
//! ## Usage
//!
//! ```sh
//! # Show channels and time range
//! robosource info recording.mcap
//!
//! # Print messages in log-time order
//! robosource cat https://host/recording.mcap --topics /imu,/odom --limit 20
//!
//! # Latest message per topic before a point in time
//! robosource backfill recording.mcap --time 1700000000 --topics /tf_static
//! ```

mod cmd;
mod common;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use cmd::{BackfillCmd, CatCmd, InfoCmd};
use common::{init_logging, Result, SourceArgs};

/// Robosource - MCAP playback source
///
/// Reads local files or HTTP URLs, using the file's index when it has a
/// usable one and streaming it otherwise.
#[derive(Parser, Clone)]
#[command(name = "robosource")]
#[command(about = "Iterable playback source for MCAP files and URLs", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "ArcheBase")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Clone)]
enum Commands {
    /// Show channels, schemas and time range
    Info(InfoCmd),

    /// Print messages in log-time order
    Cat(CatCmd),

    /// Show the latest message per topic at or before a time
    Backfill(BackfillCmd),
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let args = SourceArgs {
        config: cli.config,
    };

    match cli.command {
        Commands::Info(cmd) => cmd.run(&args),
        Commands::Cat(cmd) => cmd.run(&args),
        Commands::Backfill(cmd) => cmd.run(&args),
    }
}

fn main() {
    let result = run();

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
