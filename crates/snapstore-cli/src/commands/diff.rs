//! Diff command
//!
//! Usage: snapstore diff --seed <FILE> <LEFT> <RIGHT> [--shallow] [--items]

use clap::Args;
use snapstore_core::diff::{render_human_summary, CompareMode};
use snapstore_core::{ContainerConfig, Locator};

use super::seed::{load_container, SeedArgs};

#[derive(Debug, Args)]
pub struct DiffArgs {
    #[command(flatten)]
    pub seed: SeedArgs,

    pub left: String,
    pub right: String,

    /// Compare first-level keys only
    #[arg(long)]
    pub shallow: bool,

    /// Compare the data payloads only, ignoring metadata
    #[arg(long)]
    pub items: bool,

    /// Print the structured diff as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(config: &ContainerConfig, args: DiffArgs) -> anyhow::Result<()> {
    let container = load_container(config, &args.seed)?;
    let left = Locator::parse(&args.left);
    let right = Locator::parse(&args.right);
    let mode = if args.shallow {
        CompareMode::Shallow
    } else {
        CompareMode::Deep
    };

    let diff = if args.items {
        container.compare_snapshot_items(&left, &right, mode)?
    } else {
        container.compare_snapshots(&left, &right, mode)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
    } else {
        print!("{}", render_human_summary(&diff));
    }
    Ok(())
}
