//! `cadence init [--force]`

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;

use cadence_core::{config, Config};

/// Write a default `cadence.yaml` and create the source directories.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing cadence.yaml.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        fs::create_dir_all(root)
            .with_context(|| format!("cannot create project directory '{}'", root.display()))?;
        let config_path = config::config_path_at(root);
        if config_path.exists() && !self.force {
            bail!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            );
        }

        let config = Config::default();
        let written = config::save_at(root, &config)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!("✓ Wrote {}", written.display());

        let source = root.join(&config.source);
        for dir in [
            source.clone(),
            source.join(&config.styles.root),
            source.join(&config.scripts.root),
            source.join(&config.static_files.root),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("cannot create '{}'", dir.display()))?;
        }
        println!("  Sources go in {}", source.display());
        Ok(())
    }
}
