//! `watch` and `run` sessions: registry assembly, Ctrl-C handling and the
//! concurrent server + watcher pair.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cadence_core::{Executor, Node, Project, Registry};
use cadence_pipeline::{register_builtin, register_config_tasks, watch_specs, BuildOptions};

use crate::error::DaemonError;
use crate::server::{self, register_reload, Reloader};
use crate::watch::{watch, WatchBinding};

/// Install the global `tracing` subscriber (`RUST_LOG`, default `info`).
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Every task a project can run: built-ins, `reload` when serving, then
/// the `tasks:` compositions. Each registered name is validated so a typo
/// or cycle in `cadence.yaml` fails before anything runs.
pub fn build_registry(
    project: Arc<Project>,
    options: BuildOptions,
    reloader: Option<Reloader>,
) -> Result<Registry, DaemonError> {
    let mut registry = Registry::new();
    register_builtin(&mut registry, Arc::clone(&project), options)?;
    if let Some(reloader) = reloader {
        register_reload(&mut registry, reloader)?;
    }
    register_config_tasks(&mut registry, &project)?;

    let names: Vec<_> = registry.names().into_iter().cloned().collect();
    for name in names {
        registry.validate(&Node::task(name))?;
    }
    Ok(registry)
}

/// One binding per pipeline input tree; with `then`, each binding runs
/// `series(step, then)`.
pub fn bindings_for(project: &Project, then: Option<&str>) -> Result<Vec<WatchBinding>, DaemonError> {
    watch_specs(project)
        .iter()
        .map(|spec| WatchBinding::from_spec(spec, then))
        .collect()
}

fn coalesce_window(project: &Project) -> Duration {
    Duration::from_millis(project.config.watch.debounce_ms)
}

/// Token cancelled on Ctrl-C.
pub fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => tracing::info!("received ctrl-c, shutting down"),
                    Err(err) => tracing::error!(error = %err, "ctrl-c handler failed"),
                }
                token.cancel();
            }
        }
    });
    cancel
}

/// Watch the source tree and re-run steps until `cancel` fires.
pub async fn run_watch(project: Arc<Project>, cancel: CancellationToken) -> Result<(), DaemonError> {
    let registry = build_registry(Arc::clone(&project), BuildOptions::default(), None)?;
    let executor = Executor::new(Arc::new(registry));
    let bindings = bindings_for(&project, None)?;
    watch(bindings, executor, coalesce_window(&project), cancel).await
}

/// Build, then serve the output with live reload while watching, until
/// `cancel` fires. `port` overrides `server.port`.
pub async fn run_serve(
    project: Arc<Project>,
    port: Option<u16>,
    cancel: CancellationToken,
) -> Result<(), DaemonError> {
    let reloader = Reloader::new();
    let options = BuildOptions {
        dry_run: false,
        dev: true,
    };
    let registry = build_registry(Arc::clone(&project), options, Some(reloader.clone()))?;
    let executor = Executor::new(Arc::new(registry));

    executor.run_with_cancel(&Node::task("build"), &cancel).await?;

    let server_config = &project.config.server;
    let listener = server::bind(&server_config.host, port.unwrap_or(server_config.port)).await?;
    let app = server::router(&project.output_dir(), reloader, cancel.clone());
    let bindings = bindings_for(&project, Some("reload"))?;

    let serving = server::serve(listener, app, cancel.clone());
    let watching = watch(bindings, executor, coalesce_window(&project), cancel.clone());
    let result = tokio::try_join!(serving, watching).map(|_| ());
    // Either half failing stops the other.
    cancel.cancel();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{Config, TaskError, TaskName};

    #[test]
    fn registry_includes_reload_when_serving() {
        let project = Arc::new(Project::new("/tmp/site", Config::default()));
        let registry = build_registry(Arc::clone(&project), BuildOptions::default(), Some(Reloader::new())).unwrap();
        assert!(registry.contains(&TaskName::from("reload")));

        let registry = build_registry(project, BuildOptions::default(), None).unwrap();
        assert!(!registry.contains(&TaskName::from("reload")));
    }

    #[test]
    fn config_task_with_unknown_leaf_is_rejected() {
        let mut config = Config::default();
        config.tasks.insert(TaskName::from("ship"), Node::series(["build", "deploy"]));
        let project = Arc::new(Project::new("/tmp/site", config));
        let err = build_registry(project, BuildOptions::default(), None).unwrap_err();
        assert!(
            matches!(err, DaemonError::Task(TaskError::UnknownTask { ref name }) if name.as_str() == "deploy"),
            "{err:?}"
        );
    }

    #[test]
    fn config_task_cycle_is_rejected() {
        let mut config = Config::default();
        config.tasks.insert(TaskName::from("a"), Node::task("b"));
        config.tasks.insert(TaskName::from("b"), Node::task("a"));
        let project = Arc::new(Project::new("/tmp/site", config));
        let err = build_registry(project, BuildOptions::default(), None).unwrap_err();
        assert!(matches!(err, DaemonError::Task(TaskError::CyclicDependency { .. })), "{err:?}");
    }

    #[test]
    fn serve_bindings_chain_reload() {
        let project = Project::new("/tmp/site", Config::default());
        let bindings = bindings_for(&project, Some("reload")).unwrap();
        let nodes: Vec<String> = bindings.iter().map(|b| b.node.to_string()).collect();
        assert_eq!(
            nodes,
            ["markup -> reload", "styles -> reload", "scripts -> reload", "static -> reload"]
        );
    }

    #[tokio::test]
    async fn serve_builds_then_stops_on_cancel() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/index.html"), "<body>hi</body>").unwrap();
        let mut config = Config::default();
        config.server.port = 0;
        config.styles.entries.clear();
        let project = Arc::new(Project::new(dir.path(), config));

        let cancel = CancellationToken::new();
        let session = tokio::spawn(run_serve(Arc::clone(&project), None, cancel.clone()));
        let index = dir.path().join("dist/index.html");
        for _ in 0..200 {
            if index.is_file() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(index.is_file());

        cancel.cancel();
        session.await.unwrap().unwrap();
    }
}
