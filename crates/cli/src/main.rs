//! domwatch CLI - replay and check watcher scenarios

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

mod cmd;

/// domwatch - Debounced DOM mutation watching
#[derive(Parser)]
#[command(name = "domwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario and report when the callback fired
    Replay {
        /// Scenario file (TOML)
        scenario: PathBuf,
        /// Use real tokio timers instead of a virtual clock
        #[arg(long)]
        realtime: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse a scenario and show the resolved watcher configuration
    Validate {
        /// Scenario file (TOML)
        scenario: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            scenario,
            realtime,
            json,
        } => cmd::replay::run(&scenario, realtime, json).await,
        Commands::Validate { scenario } => cmd::validate::run(&scenario).await,
    }
}
