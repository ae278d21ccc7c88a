//! `cadence tasks` — registered names, kinds and descriptions.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use cadence_core::{Registry, TaskEntry};
use cadence_daemon::build_registry;
use cadence_pipeline::BuildOptions;

use super::load_project;

/// Arguments for `cadence tasks`.
#[derive(Args, Debug)]
pub struct TasksArgs {
    /// Print names only, one per line.
    #[arg(long)]
    pub names: bool,
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "task")]
    name: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "description")]
    description: String,
}

impl TasksArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let project = load_project(root)?;
        let registry = build_registry(Arc::clone(&project), BuildOptions::default(), None)
            .context("invalid task configuration")?;

        if self.names {
            for name in registry.names() {
                println!("{name}");
            }
            return Ok(());
        }

        let mut table = Table::new(rows(&registry));
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn rows(registry: &Registry) -> Vec<TaskRow> {
    registry
        .names()
        .into_iter()
        .filter_map(|name| {
            let entry = registry.lookup(name).ok()?;
            let description = match entry {
                TaskEntry::Composite(node) => registry
                    .description(name)
                    .map(str::to_string)
                    .unwrap_or_else(|| node.to_string()),
                TaskEntry::Body(_) => registry.description(name).unwrap_or_default().to_string(),
            };
            Some(TaskRow {
                name: name.to_string(),
                kind: entry.kind().to_string(),
                description,
            })
        })
        .collect()
}
