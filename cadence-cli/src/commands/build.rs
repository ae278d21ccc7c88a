//! `cadence build [--dry-run]`

use std::path::Path;

use anyhow::Result;
use clap::Args;

/// Arguments for `cadence build`.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Report what would be written without writing or cleaning.
    #[arg(long)]
    pub dry_run: bool,
}

impl BuildArgs {
    pub async fn run(self, root: &Path) -> Result<()> {
        super::exec::run_tasks(root, &["build".to_string()], self.dry_run).await
    }
}
