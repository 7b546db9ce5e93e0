//! stratify command-line interface.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "stratify", about = "Index and query entity-structured file trees")]
struct Cli {
    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index one or more roots and summarize the result
    Index(cli::index::IndexArgs),

    /// Query the index with entity filters
    Query(cli::query::QueryArgs),

    /// Find the nearest file matching a query, walking up from a path
    Nearest(cli::nearest::NearestArgs),

    /// Build a path from entity values and templates
    BuildPath(cli::build_path::BuildPathArgs),
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Index(args) => cli::index::run(args),
        Commands::Query(args) => cli::query::run(args),
        Commands::Nearest(args) => cli::nearest::run(args),
        Commands::BuildPath(args) => cli::build_path::run(args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    stratify::logging::init_logging(cli.verbose);

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(1)
        }
    }
}
