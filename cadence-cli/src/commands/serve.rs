//! `cadence watch` and `cadence run` (alias `serve`).

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use cadence_daemon::{run_serve, run_watch, shutdown_token};

use super::load_project;

/// Arguments for `cadence run`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port for the dev server (overrides `server.port`; 0 picks one).
    #[arg(long, short)]
    pub port: Option<u16>,
}

impl ServeArgs {
    pub async fn run(self, root: &Path) -> Result<()> {
        let project = load_project(root)?;
        run_serve(project, self.port, shutdown_token())
            .await
            .context("dev server session failed")
    }
}

pub async fn watch(root: &Path) -> Result<()> {
    let project = load_project(root)?;
    run_watch(project, shutdown_token())
        .await
        .context("watch session failed")
}
