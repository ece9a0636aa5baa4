//! Kestrel configuration and class hierarchy checker

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kestrel_cli::commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kestrel-check")]
#[command(about = "Check Kestrel runtime configuration and classes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a configuration file
    Config {
        /// Configuration file
        path: PathBuf,
    },

    /// Print the registered class hierarchy
    Classes {
        /// Configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { path } => commands::config::execute(&path),
        Commands::Classes { config, json } => commands::classes::execute(config.as_deref(), json),
    }
}
