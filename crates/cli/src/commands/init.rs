//! Init-config Command

use std::path::Path;

use anyhow::{bail, Result};
use clap::Args;
use uitrace_common::Config;

use crate::output::print_success;

#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Write the default configuration to the config path
pub fn execute(args: InitArgs, config_path: &Path) -> Result<()> {
    if config_path.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    Config::default().save(config_path)?;
    print_success(&format!("Wrote default configuration to {}", config_path.display()));
    Ok(())
}
