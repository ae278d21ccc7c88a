//! Watch binder: filesystem changes under a binding's root re-run the
//! binding's node, coalesced so a burst of saves costs one run.
//!
//! Each binding has its own driver task. A driver never runs its node
//! concurrently with itself; changes that arrive mid-run collapse into a
//! single follow-up run.

use std::collections::HashSet;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::GlobSet;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use cadence_core::{Executor, Node};
use cadence_pipeline::source::build_globset;
use cadence_pipeline::WatchSpec;

use crate::error::DaemonError;

pub const COALESCE_WINDOW: Duration = Duration::from_millis(200);

/// Source tree -> node to run when it changes.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    pub name: String,
    pub root: PathBuf,
    pub patterns: GlobSet,
    pub node: Node,
}

impl WatchBinding {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        patterns: &[String],
        node: Node,
    ) -> Result<Self, DaemonError> {
        Ok(Self {
            name: name.into(),
            root: root.into(),
            patterns: build_globset(patterns)?,
            node,
        })
    }

    /// Binding for a pipeline watch spec. With `then`, the node becomes
    /// `series(task, then)`.
    pub fn from_spec(spec: &WatchSpec, then: Option<&str>) -> Result<Self, DaemonError> {
        let node = match then {
            Some(next) => Node::series([Node::task(&spec.task), Node::task(next)]),
            None => Node::task(&spec.task),
        };
        Self::new(spec.task.to_string(), spec.root.clone(), &spec.patterns, node)
    }

    /// `true` when `path` is under the root and matches a pattern.
    pub fn matches(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root)
            .map(|rel| self.patterns.is_match(rel))
            .unwrap_or(false)
    }

    fn wants(&self, event: &Event) -> bool {
        is_relevant_event_kind(&event.kind) && event.paths.iter().any(|p| self.matches(p))
    }

    // Event paths arrive as real paths (/private/var/... on macOS).
    fn canonicalized(mut self) -> Self {
        if let Ok(root) = fs::canonicalize(&self.root) {
            self.root = root;
        }
        self
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
}

/// Install a recursive watcher over every binding root and drive each
/// binding until `cancel` fires.
///
/// Roots that do not exist are skipped with a warning.
pub async fn watch(
    bindings: Vec<WatchBinding>,
    executor: Executor,
    window: Duration,
    cancel: CancellationToken,
) -> Result<(), DaemonError> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;

    let mut roots = HashSet::new();
    let mut routes = Vec::new();
    let mut drivers = JoinSet::new();
    for binding in bindings {
        let binding = binding.canonicalized();
        if !binding.root.is_dir() {
            tracing::warn!(
                binding = %binding.name,
                root = %binding.root.display(),
                "watch root does not exist; skipping",
            );
            continue;
        }
        if roots.insert(binding.root.clone()) {
            watcher.watch(&binding.root, RecursiveMode::Recursive)?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let executor = executor.clone();
        let name = binding.name.clone();
        let node = binding.node.clone();
        let run_cancel = cancel.clone();
        drivers.spawn(drive(rx, window, cancel.clone(), move || {
            run_binding(executor.clone(), name.clone(), node.clone(), run_cancel.clone())
        }));
        tracing::info!(
            binding = %binding.name,
            root = %binding.root.display(),
            node = %binding.node,
            "watching",
        );
        routes.push((binding, tx));
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                for (binding, tx) in &routes {
                    if binding.wants(&event) {
                        tracing::trace!(binding = %binding.name, paths = ?event.paths, "change");
                        let _ = tx.send(());
                    }
                }
            }
        }
    }

    drop(routes);
    drop(watcher);
    while let Some(joined) = drivers.join_next().await {
        joined.map_err(|err| DaemonError::Join {
            task: "watch driver",
            message: err.to_string(),
        })?;
    }
    Ok(())
}

async fn run_binding(executor: Executor, binding: String, node: Node, cancel: CancellationToken) {
    let started = Instant::now();
    match executor.run_with_cancel(&node, &cancel).await {
        Ok(()) => tracing::info!(
            binding = %binding,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rebuilt",
        ),
        Err(err) if err.is_cancelled() => tracing::debug!(binding = %binding, "run cancelled"),
        Err(err) => tracing::error!(
            binding = %binding,
            task = ?err.origin().map(|t| t.as_str()),
            error = %err,
            "run failed; still watching",
        ),
    }
}

/// Per-binding loop: wait for a trigger, absorb further triggers for
/// `window`, run once. Triggers during a run set a pending flag that
/// yields exactly one more (coalesced) run.
///
/// Returns when `cancel` fires or the trigger channel closes.
pub async fn drive<F, Fut>(
    mut events: mpsc::UnboundedReceiver<()>,
    window: Duration,
    cancel: CancellationToken,
    mut run: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut open = true;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            event = events.recv() => {
                if event.is_none() {
                    return;
                }
            }
        }

        loop {
            let deadline = Instant::now() + window;
            while open {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep_until(deadline) => break,
                    event = events.recv() => open = event.is_some(),
                }
            }

            let mut pending = false;
            let running = run();
            tokio::pin!(running);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    () = &mut running => break,
                    event = events.recv(), if open => match event {
                        Some(()) => pending = true,
                        None => open = false,
                    },
                }
            }
            if !pending {
                break;
            }
        }

        if !open {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use cadence_core::{Registry, TaskError, TaskName};
    use notify::event::{CreateKind, DataChange, ModifyKind};

    const WINDOW: Duration = Duration::from_millis(200);

    fn counting(runs: &Arc<AtomicUsize>, busy: Duration) -> impl FnMut() -> futures::future::BoxFuture<'static, ()> {
        let runs = Arc::clone(runs);
        move || {
            let runs = Arc::clone(&runs);
            Box::pin(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(busy).await;
            })
        }
    }

    fn styles_binding() -> WatchBinding {
        WatchBinding::new(
            "styles",
            "/tmp/site/src/scss",
            &["**/*.scss".to_string()],
            Node::task("styles"),
        )
        .unwrap()
    }

    #[test]
    fn matches_only_under_root_and_patterns() {
        let binding = styles_binding();
        assert!(binding.matches(Path::new("/tmp/site/src/scss/style.scss")));
        assert!(binding.matches(Path::new("/tmp/site/src/scss/parts/_nav.scss")));
        assert!(!binding.matches(Path::new("/tmp/site/src/scss/style.css")));
        assert!(!binding.matches(Path::new("/tmp/site/src/js/app.scss")));
    }

    #[test]
    fn wants_relevant_events_only() {
        let binding = styles_binding();
        let path = PathBuf::from("/tmp/site/src/scss/style.scss");
        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path.clone());
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any)).add_path(path);
        assert!(binding.wants(&modify));
        assert!(binding.wants(&create));
        assert!(!binding.wants(&access));
    }

    #[test]
    fn from_spec_chains_follow_up_task() {
        let spec = WatchSpec {
            task: TaskName::from("styles"),
            root: PathBuf::from("/tmp/site/src/scss"),
            patterns: vec!["**/*.scss".to_string()],
        };
        let plain = WatchBinding::from_spec(&spec, None).unwrap();
        assert_eq!(plain.node.to_string(), "styles");
        let chained = WatchBinding::from_spec(&spec, Some("reload")).unwrap();
        assert_eq!(chained.node.to_string(), "styles -> reload");
    }

    #[tokio::test(start_paused = true)]
    async fn burst_inside_window_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drive(rx, WINDOW, cancel.clone(), counting(&runs, Duration::ZERO)));

        for _ in 0..10 {
            tx.send(()).unwrap();
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn changes_mid_run_yield_one_follow_up() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drive(
            rx,
            WINDOW,
            cancel.clone(),
            counting(&runs, Duration::from_millis(500)),
        ));

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1, "first run in flight");

        for _ in 0..3 {
            tx.send(()).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_run_separately() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drive(rx, WINDOW, cancel.clone(), counting(&runs, Duration::ZERO)));

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_runs_keep_the_binding_alive() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        let counter = Arc::clone(&attempts);
        registry
            .register("broken", move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TaskError::transform("broken", "boom"))
                }
            })
            .unwrap();
        let executor = Executor::new(Arc::new(registry));

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(drive(rx, WINDOW, cancel.clone(), move || {
            run_binding(
                executor.clone(),
                "broken".to_string(),
                Node::task("broken"),
                run_cancel.clone(),
            )
        }));

        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    fn counting_task(registry: &mut Registry, name: &str) -> Arc<AtomicUsize> {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        registry
            .register(name, move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();
        runs
    }

    async fn wait_for(runs: &AtomicUsize, at_least: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if runs.load(Ordering::SeqCst) >= at_least {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn file_changes_run_only_the_matching_binding() {
        let dir = tempfile::TempDir::new().unwrap();
        let scss = dir.path().join("scss");
        let js = dir.path().join("js");
        fs::create_dir_all(&scss).unwrap();
        fs::create_dir_all(&js).unwrap();

        let mut registry = Registry::new();
        let styles = counting_task(&mut registry, "styles");
        let scripts = counting_task(&mut registry, "scripts");
        let executor = Executor::new(Arc::new(registry));

        let bindings = vec![
            WatchBinding::new("styles", &scss, &["**/*.scss".to_string()], Node::task("styles")).unwrap(),
            WatchBinding::new("scripts", &js, &["*.js".to_string()], Node::task("scripts")).unwrap(),
            WatchBinding::new("missing", dir.path().join("nope"), &["*".to_string()], Node::task("scripts"))
                .unwrap(),
        ];
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watch(bindings, executor, Duration::from_millis(50), cancel.clone()));
        tokio::time::sleep(Duration::from_millis(300)).await;

        fs::write(scss.join("notes.txt"), "not a stylesheet").unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(styles.load(Ordering::SeqCst), 0, "non-matching file must not trigger");

        fs::write(scss.join("style.scss"), ".nav { color: red; }").unwrap();
        assert!(wait_for(&styles, 1).await, "styles never ran");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(scripts.load(Ordering::SeqCst), 0);

        cancel.cancel();
        let finished = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(matches!(finished, Ok(Ok(Ok(())))), "watch did not stop on cancel");
    }
}
