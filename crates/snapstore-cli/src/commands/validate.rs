//! Validate command
//!
//! Usage: snapstore validate --seed <FILE>
//!
//! Prints every refused seed link and every hierarchy violation; exits
//! non-zero when there is one.

use clap::Args;
use snapstore_core::errors::ExError;
use snapstore_core::ContainerConfig;

use super::seed::{populate, SeedArgs};

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub seed: SeedArgs,
}

pub fn execute(config: &ContainerConfig, args: ValidateArgs) -> anyhow::Result<()> {
    let (mut container, refused) = populate(config, &args.seed)?;
    container.sweep_expired();

    for failure in &refused {
        println!(
            "{} (linking {} under {})",
            ExError::from(failure.error.clone()),
            failure.child,
            failure.parent
        );
    }
    let violations = container.hierarchy_violations();
    for violation in &violations {
        println!("{}", ExError::from(violation.clone()));
    }

    let total = refused.len() + violations.len();
    if total == 0 {
        println!("Hierarchy OK ({} snapshot(s))", container.len());
        return Ok(());
    }

    anyhow::bail!("{total} hierarchy violation(s)")
}
