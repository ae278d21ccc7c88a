//! cadence — asset pipeline task runner.
//!
//! # Usage
//!
//! ```text
//! cadence [--project DIR] build [--dry-run]
//! cadence [--project DIR] clean
//! cadence [--project DIR] watch
//! cadence [--project DIR] run|serve [--port N]
//! cadence [--project DIR] exec <task>... [--dry-run]
//! cadence [--project DIR] tasks
//! cadence [--project DIR] init [--force]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    build::BuildArgs, exec::ExecArgs, init::InitArgs, serve::ServeArgs, tasks::TasksArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "cadence",
    version,
    about = "Build, watch and serve a static front-end project",
    long_about = None,
)]
struct Cli {
    /// Project root containing cadence.yaml.
    #[arg(long, short = 'C', global = true, default_value = ".")]
    project: PathBuf,

    /// Debug-level logging (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clean, then run every pipeline step.
    Build(BuildArgs),

    /// Remove the output directory.
    Clean,

    /// Re-run pipeline steps when their sources change.
    Watch,

    /// Build, serve the output with live reload, and watch.
    #[command(alias = "serve")]
    Run(ServeArgs),

    /// Run registered tasks in series.
    Exec(ExecArgs),

    /// List registered tasks.
    Tasks(TasksArgs),

    /// Write a default cadence.yaml and source layout.
    Init(InitArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cadence_daemon::init_tracing(cli.verbose);

    let root = cli.project;
    match cli.command {
        Commands::Build(args) => args.run(&root).await,
        Commands::Clean => commands::exec::run_tasks(&root, &["clean".to_string()], false).await,
        Commands::Watch => commands::serve::watch(&root).await,
        Commands::Run(args) => args.run(&root).await,
        Commands::Exec(args) => args.run(&root).await,
        Commands::Tasks(args) => args.run(&root),
        Commands::Init(args) => args.run(&root),
    }
}
