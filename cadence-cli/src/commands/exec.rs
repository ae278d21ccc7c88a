//! `cadence exec <task>...` and the shared task-running path behind
//! `build` and `clean`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use cadence_core::{Executor, Node, TaskError};
use cadence_daemon::{build_registry, shutdown_token};
use cadence_pipeline::BuildOptions;

use super::load_project;

/// Arguments for `cadence exec`.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Registered task names, run one after another.
    #[arg(required = true, num_args = 1..)]
    pub tasks: Vec<String>,

    /// Report what would be written without writing.
    #[arg(long)]
    pub dry_run: bool,
}

impl ExecArgs {
    pub async fn run(self, root: &Path) -> Result<()> {
        run_tasks(root, &self.tasks, self.dry_run).await
    }
}

/// Run `names` in series against the project at `root`.
pub async fn run_tasks(root: &Path, names: &[String], dry_run: bool) -> Result<()> {
    let project = load_project(root)?;
    let options = BuildOptions { dry_run, dev: false };
    let registry = build_registry(Arc::clone(&project), options, None)
        .context("invalid task configuration")?;
    let executor = Executor::new(Arc::new(registry));

    let node = match names {
        [single] => Node::task(single.as_str()),
        many => Node::series(many.iter().map(String::as_str)),
    };
    let started = Instant::now();
    let result = executor.run_with_cancel(&node, &shutdown_token()).await;
    let elapsed = started.elapsed().as_millis();

    match result {
        Ok(()) => {
            let prefix = if dry_run { "[dry-run] " } else { "" };
            println!("{prefix}{} {node} finished in {elapsed} ms", "✓".green());
            Ok(())
        }
        Err(err) => {
            let origin = failed_task(&err);
            eprintln!("{} {node} failed after {elapsed} ms", "✗".red());
            Err(err).with_context(|| format!("task '{origin}' failed"))
        }
    }
}

fn failed_task(err: &TaskError) -> String {
    err.origin()
        .map(|name| name.to_string())
        .unwrap_or_else(|| "<run>".to_string())
}
