//! Executor — walks a [`Node`] against a frozen [`Registry`].
//!
//! ## Failure policy
//!
//! - `Series`: fail-fast. The first failing child stops the series; later
//!   siblings never start.
//! - `Parallel`: collect-all. Every child runs to completion. Failures are
//!   kept in completion order; the earliest is surfaced and the remainder
//!   travel in [`TaskError::Aggregate`].
//!
//! Parallel children are polled concurrently on the calling task; bodies
//! that do blocking work are expected to hop onto `spawn_blocking`.

use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::node::Node;
use crate::registry::{cycle_error, Registry, TaskEntry};
use crate::types::TaskName;

#[derive(Clone)]
pub struct Executor {
    registry: Arc<Registry>,
}

impl Executor {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run `node` to completion.
    pub async fn run(&self, node: &Node) -> Result<(), TaskError> {
        self.run_with_cancel(node, &CancellationToken::new()).await
    }

    /// Run a single registered name.
    pub async fn run_task(&self, name: impl Into<TaskName>) -> Result<(), TaskError> {
        self.run(&Node::task(name)).await
    }

    /// Run `node`, resolving outstanding leaves to [`TaskError::Cancelled`]
    /// once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        node: &Node,
        cancel: &CancellationToken,
    ) -> Result<(), TaskError> {
        let started = Instant::now();
        tracing::debug!(node = %node, "run started");
        let result = self.run_node(node, Vec::new(), cancel).await;
        match &result {
            Ok(()) => tracing::debug!(
                node = %node,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "run finished",
            ),
            Err(err) => tracing::debug!(node = %node, error = %err, "run failed"),
        }
        result
    }

    fn run_node<'a>(
        &'a self,
        node: &'a Node,
        chain: Vec<TaskName>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), TaskError>> {
        async move {
            match node {
                Node::Leaf(name) => self.run_leaf(name, chain, cancel).await,
                Node::Series(children) => {
                    for child in children {
                        if cancel.is_cancelled() {
                            return Err(TaskError::Cancelled);
                        }
                        self.run_node(child, chain.clone(), cancel).await?;
                    }
                    Ok(())
                }
                Node::Parallel(children) => {
                    let mut pending: FuturesUnordered<_> = children
                        .iter()
                        .map(|child| self.run_node(child, chain.clone(), cancel))
                        .collect();

                    let mut failures = Vec::new();
                    while let Some(result) = pending.next().await {
                        if let Err(err) = result {
                            failures.push(err);
                        }
                    }
                    aggregate(failures)
                }
            }
        }
        .boxed()
    }

    async fn run_leaf(
        &self,
        name: &TaskName,
        mut chain: Vec<TaskName>,
        cancel: &CancellationToken,
    ) -> Result<(), TaskError> {
        if chain.contains(name) {
            return Err(cycle_error(&chain, name));
        }

        match self.registry.lookup(name)? {
            TaskEntry::Composite(inner) => {
                chain.push(name.clone());
                self.run_node(inner, chain, cancel).await
            }
            TaskEntry::Body(body) => {
                if cancel.is_cancelled() {
                    return Err(TaskError::Cancelled);
                }
                let started = Instant::now();
                tracing::info!(task = %name, "starting");
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(TaskError::Cancelled),
                    result = body() => result,
                };
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match outcome {
                    Ok(()) => {
                        tracing::info!(task = %name, elapsed_ms, "finished");
                        Ok(())
                    }
                    Err(TaskError::Cancelled) => {
                        tracing::warn!(task = %name, "cancelled");
                        Err(TaskError::Cancelled)
                    }
                    Err(err) => {
                        tracing::error!(task = %name, elapsed_ms, error = %err, "failed");
                        Err(TaskError::Failed {
                            task: name.clone(),
                            source: Box::new(err),
                        })
                    }
                }
            }
        }
    }
}

fn aggregate(mut failures: Vec<TaskError>) -> Result<(), TaskError> {
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => {
            let first = failures.remove(0);
            for suppressed in &failures {
                tracing::debug!(error = %suppressed, "additional parallel failure");
            }
            Err(TaskError::Aggregate {
                first: Box::new(first),
                rest: failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(registry: &mut Registry, log: &Log, name: &'static str, delay_ms: u64, fail: bool) {
        let log = log.clone();
        registry
            .register(name, move || {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("start:{name}"));
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    log.lock().unwrap().push(format!("end:{name}"));
                    if fail {
                        Err(TaskError::transform(name, "boom"))
                    } else {
                        Ok(())
                    }
                }
            })
            .expect("register");
    }

    fn executor(registry: Registry) -> Executor {
        Executor::new(Arc::new(registry))
    }

    #[tokio::test(start_paused = true)]
    async fn series_runs_children_strictly_in_order() {
        let log: Log = Arc::default();
        let mut registry = Registry::new();
        recording(&mut registry, &log, "a", 30, false);
        recording(&mut registry, &log, "b", 10, false);
        recording(&mut registry, &log, "c", 20, false);

        executor(registry)
            .run(&Node::series(["a", "b", "c"]))
            .await
            .expect("series");

        assert_eq!(
            *log.lock().unwrap(),
            ["start:a", "end:a", "start:b", "end:b", "start:c", "end:c"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn series_failure_stops_later_siblings() {
        let log: Log = Arc::default();
        let mut registry = Registry::new();
        recording(&mut registry, &log, "a", 5, true);
        recording(&mut registry, &log, "b", 5, false);
        recording(&mut registry, &log, "c", 5, false);

        let err = executor(registry)
            .run(&Node::series(["a", "b", "c"]))
            .await
            .unwrap_err();

        assert_eq!(err.origin().map(TaskName::as_str), Some("a"));
        let log = log.lock().unwrap();
        assert!(!log.iter().any(|e| e.ends_with(":b") || e.ends_with(":c")));
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_runs_every_child_even_when_one_fails() {
        let log: Log = Arc::default();
        let mut registry = Registry::new();
        recording(&mut registry, &log, "a", 5, true);
        recording(&mut registry, &log, "b", 50, false);

        let err = executor(registry)
            .run(&Node::parallel(["a", "b"]))
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Failed { ref task, .. } if task.as_str() == "a"));
        let log = log.lock().unwrap();
        assert!(log.contains(&"end:b".to_string()), "b must complete: {log:?}");
        let first_end = log.iter().position(|e| e.starts_with("end:")).expect("an end");
        assert!(log[..first_end].contains(&"start:a".to_string()));
        assert!(log[..first_end].contains(&"start:b".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_surfaces_first_failure_by_completion_order() {
        let log: Log = Arc::default();
        let mut registry = Registry::new();
        recording(&mut registry, &log, "slow", 40, true);
        recording(&mut registry, &log, "fast", 10, true);

        let err = executor(registry)
            .run(&Node::parallel(["slow", "fast"]))
            .await
            .unwrap_err();

        match err {
            TaskError::Aggregate { first, rest } => {
                assert_eq!(first.origin().map(TaskName::as_str), Some("fast"));
                assert_eq!(rest.len(), 1);
                assert_eq!(rest[0].origin().map(TaskName::as_str), Some("slow"));
            }
            other => panic!("expected aggregate, got {other}"),
        }
    }

    #[tokio::test]
    async fn unknown_leaf_fails_at_run_time() {
        let err = executor(Registry::new())
            .run_task("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::UnknownTask { .. }));
    }

    #[tokio::test]
    async fn composite_cycle_is_reported_not_hung() {
        let mut registry = Registry::new();
        registry
            .register_composite("watch", Node::series(["rebuild"]))
            .expect("watch");
        registry
            .register_composite("rebuild", Node::parallel(["watch"]))
            .expect("rebuild");

        let err = executor(registry).run_task("watch").await.unwrap_err();
        assert!(
            matches!(err, TaskError::CyclicDependency { ref chain } if chain == "watch -> rebuild -> watch"),
            "got {err}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_outstanding_tasks() {
        let log: Log = Arc::default();
        let mut registry = Registry::new();
        recording(&mut registry, &log, "long", 10_000, false);
        recording(&mut registry, &log, "after", 1, false);

        let exec = executor(registry);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = exec
            .run_with_cancel(&Node::series(["long", "after"]), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(*log.lock().unwrap(), ["start:long"]);
    }
}
