//! Tree command
//!
//! Usage: snapstore tree --seed <FILE> <ROOT>

use clap::Args;
use snapstore_core::{ContainerConfig, Locator, SnapshotContainer, SnapshotRef};

use super::list::describe;
use super::seed::{load_container, SeedArgs};

#[derive(Debug, Args)]
pub struct TreeArgs {
    #[command(flatten)]
    pub seed: SeedArgs,

    /// Root snapshot, `store/id` or a bare id
    pub root: String,
}

pub fn execute(config: &ContainerConfig, args: TreeArgs) -> anyhow::Result<()> {
    let container = load_container(config, &args.seed)?;
    let root = container.resolve(&Locator::parse(&args.root))?;

    // Fails with CycleDetected before anything is printed.
    container.descendants(&Locator::from(&root))?;

    let mut out = String::new();
    render(&container, &root, 0, &mut out)?;
    print!("{out}");
    Ok(())
}

fn render(
    container: &SnapshotContainer,
    node: &SnapshotRef,
    depth: usize,
    out: &mut String,
) -> anyhow::Result<()> {
    let locator = Locator::from(node);
    let snapshot = container.peek(&locator)?;
    out.push_str(&"  ".repeat(depth));
    out.push_str(&describe(snapshot));
    out.push('\n');
    for child in container.children(&locator)? {
        render(container, &child, depth + 1, out)?;
    }
    Ok(())
}
