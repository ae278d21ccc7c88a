pub mod build;
pub mod exec;
pub mod init;
pub mod serve;
pub mod tasks;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use cadence_core::{config, Project};

/// Load `<root>/cadence.yaml` (defaults when absent).
pub fn load_project(root: &Path) -> Result<Arc<Project>> {
    let root = root
        .canonicalize()
        .with_context(|| format!("cannot resolve project directory '{}'", root.display()))?;
    let project = config::load_at(&root)
        .with_context(|| format!("failed to load {}", config::config_path_at(&root).display()))?;
    Ok(Arc::new(project))
}
