//! snapstore CLI
//!
//! Loads a seed file into an in-memory container and inspects it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use snapstore_core::logging_facility;
use snapstore_core::ContainerConfig;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "snapstore")]
#[command(about = "snapstore - inspect versioned snapshot containers", long_about = None)]
struct Cli {
    /// Container configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List snapshots across stores
    List(commands::list::ListArgs),
    /// Print the hierarchy below a snapshot
    Tree(commands::tree::TreeArgs),
    /// Compare two snapshots
    Diff(commands::diff::DiffArgs),
    /// Check hierarchy invariants
    Validate(commands::validate::ValidateArgs),
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ContainerConfig> {
    match path {
        Some(path) => Ok(ContainerConfig::load(path)?),
        None => {
            let mut config = ContainerConfig::default();
            config.apply_env_overrides()?;
            Ok(config)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_ref())?;
    logging_facility::init(config.log_profile);

    match cli.command {
        Commands::List(args) => commands::list::execute(&config, args),
        Commands::Tree(args) => commands::tree::execute(&config, args),
        Commands::Diff(args) => commands::diff::execute(&config, args),
        Commands::Validate(args) => commands::validate::execute(&config, args),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
