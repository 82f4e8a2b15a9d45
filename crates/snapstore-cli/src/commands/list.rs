//! List command
//!
//! Usage: snapstore list --seed <FILE> [--store S] [--category C] [--tag T] [--json]

use clap::Args;
use snapstore_core::{
    Category, ContainerConfig, Snapshot, SnapshotFilter, SortOrder, StoreId,
};

use super::seed::{load_container, SeedArgs};

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub seed: SeedArgs,

    /// Only snapshots of this store
    #[arg(long)]
    pub store: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub tag: Option<String>,

    /// Print the snapshots as a JSON array
    #[arg(long)]
    pub json: bool,
}

pub fn execute(config: &ContainerConfig, args: ListArgs) -> anyhow::Result<()> {
    let container = load_container(config, &args.seed)?;

    if let Some(store) = &args.store {
        // Fails with StoreNotFound for an unknown store.
        container.store(&StoreId::from(store.as_str()))?;
    }

    let store = args.store.map(StoreId::from);
    let category = args.category.map(Category::from);
    let tag = args.tag;
    let filter = SnapshotFilter::predicate(move |s: &Snapshot| {
        store.as_ref().map_or(true, |id| &s.store_id == id)
            && category.as_ref().map_or(true, |c| s.category.as_ref() == Some(c))
            && tag.as_deref().map_or(true, |t| s.has_tag(t))
    });
    let snapshots = container.get_all_snapshots(Some(&filter), SortOrder::Insertion);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    for snapshot in &snapshots {
        println!("{}", describe(snapshot));
    }
    println!("{} snapshot(s)", snapshots.len());
    Ok(())
}

/// One-line description: `store/id v<version> [category] #tag ...`
pub fn describe(snapshot: &Snapshot) -> String {
    let mut line = format!("{} v{}", snapshot.reference(), snapshot.version());
    if let Some(category) = &snapshot.category {
        line.push_str(&format!(" [{category}]"));
    }
    if let Some(priority) = snapshot.metadata.priority {
        line.push_str(&format!(" !{priority}"));
    }
    for tag in &snapshot.metadata.tags {
        line.push_str(&format!(" #{tag}"));
    }
    if snapshot.is_core {
        line.push_str(" (core)");
    }
    line
}
