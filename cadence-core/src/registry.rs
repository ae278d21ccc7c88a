//! Task registry — name → runnable body or named composition.
//!
//! The registry is filled once at startup and then frozen behind an `Arc`
//! for the executor and watch binder. Registering a name twice is an error
//! ([`TaskError::DuplicateTask`]); there is no overwrite mode.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::error::TaskError;
use crate::node::Node;
use crate::types::{TaskKind, TaskName};

/// Boxed future returned by every task body.
pub type TaskFuture = BoxFuture<'static, Result<(), TaskError>>;

/// A runnable unit of work: no input, asynchronous completion.
pub type TaskBody = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// What a registered name resolves to.
#[derive(Clone)]
pub enum TaskEntry {
    Body(TaskBody),
    Composite(Node),
}

impl TaskEntry {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskEntry::Body(_) => TaskKind::Body,
            TaskEntry::Composite(_) => TaskKind::Composite,
        }
    }
}

impl std::fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskEntry::Body(_) => f.write_str("Body(..)"),
            TaskEntry::Composite(node) => f.debug_tuple("Composite").field(node).finish(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<TaskName, TaskEntry>,
    descriptions: HashMap<TaskName, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task body under `name`.
    pub fn register<F, Fut>(&mut self, name: impl Into<TaskName>, body: F) -> Result<(), TaskError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let body: TaskBody = Arc::new(move || body().boxed());
        self.insert(name.into(), TaskEntry::Body(body))
    }

    /// Register `name` as an alias for a composition.
    pub fn register_composite(
        &mut self,
        name: impl Into<TaskName>,
        node: Node,
    ) -> Result<(), TaskError> {
        self.insert(name.into(), TaskEntry::Composite(node))
    }

    fn insert(&mut self, name: TaskName, entry: TaskEntry) -> Result<(), TaskError> {
        if self.entries.contains_key(&name) {
            return Err(TaskError::DuplicateTask { name });
        }
        tracing::trace!(task = %name, kind = %entry.kind(), "registered task");
        self.entries.insert(name, entry);
        Ok(())
    }

    /// Attach a one-line description shown by `cadence tasks`.
    pub fn describe(&mut self, name: impl Into<TaskName>, text: impl Into<String>) {
        self.descriptions.insert(name.into(), text.into());
    }

    pub fn description(&self, name: &TaskName) -> Option<&str> {
        self.descriptions.get(name).map(String::as_str)
    }

    /// Resolve `name`, failing with [`TaskError::UnknownTask`] when absent.
    pub fn lookup(&self, name: &TaskName) -> Result<&TaskEntry, TaskError> {
        self.entries
            .get(name)
            .ok_or_else(|| TaskError::UnknownTask { name: name.clone() })
    }

    pub fn contains(&self, name: &TaskName) -> bool {
        self.entries.contains_key(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&TaskName> {
        let sorted: BTreeMap<&TaskName, ()> = self.entries.keys().map(|k| (k, ())).collect();
        sorted.into_keys().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that every leaf in `node` resolves and no composite expands
    /// into itself. Reports the first problem found, depth-first.
    pub fn validate(&self, node: &Node) -> Result<(), TaskError> {
        let mut chain = Vec::new();
        self.validate_inner(node, &mut chain)
    }

    fn validate_inner(&self, node: &Node, chain: &mut Vec<TaskName>) -> Result<(), TaskError> {
        match node {
            Node::Leaf(name) => {
                if chain.contains(name) {
                    return Err(cycle_error(chain, name));
                }
                if let TaskEntry::Composite(inner) = self.lookup(name)? {
                    chain.push(name.clone());
                    let result = self.validate_inner(inner, chain);
                    chain.pop();
                    result?;
                }
                Ok(())
            }
            Node::Series(children) | Node::Parallel(children) => {
                for child in children {
                    self.validate_inner(child, chain)?;
                }
                Ok(())
            }
        }
    }
}

/// Render `a -> b -> a` for a chain that re-enters `name`.
pub(crate) fn cycle_error(chain: &[TaskName], name: &TaskName) -> TaskError {
    let start = chain.iter().position(|n| n == name).unwrap_or(0);
    let mut parts: Vec<&str> = chain[start..].iter().map(TaskName::as_str).collect();
    parts.push(name.as_str());
    TaskError::CyclicDependency {
        chain: parts.join(" -> "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_registry(names: &[&str]) -> Registry {
        let mut registry = Registry::new();
        for name in names {
            registry.register(*name, || async { Ok(()) }).expect("register");
        }
        registry
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = noop_registry(&["clean"]);
        let err = registry.register("clean", || async { Ok(()) }).unwrap_err();
        assert!(matches!(err, TaskError::DuplicateTask { ref name } if name.as_str() == "clean"));

        let err = registry
            .register_composite("clean", Node::task("clean"))
            .unwrap_err();
        assert!(matches!(err, TaskError::DuplicateTask { .. }));
    }

    #[test]
    fn lookup_unknown_name_fails() {
        let registry = noop_registry(&["clean"]);
        let err = registry.lookup(&TaskName::from("nope")).unwrap_err();
        assert!(matches!(err, TaskError::UnknownTask { ref name } if name.as_str() == "nope"));
    }

    #[test]
    fn names_are_sorted() {
        let registry = noop_registry(&["styles", "clean", "markup"]);
        let names: Vec<_> = registry.names().into_iter().map(TaskName::as_str).collect();
        assert_eq!(names, ["clean", "markup", "styles"]);
    }

    #[test]
    fn validate_accepts_forward_references_once_registered() {
        let mut registry = Registry::new();
        registry
            .register_composite("build", Node::series(["clean", "styles"]))
            .expect("composite");
        assert!(registry.validate(&Node::task("build")).is_err());

        registry.register("clean", || async { Ok(()) }).expect("clean");
        registry.register("styles", || async { Ok(()) }).expect("styles");
        registry.validate(&Node::task("build")).expect("valid");
    }

    #[test]
    fn validate_detects_cycles_through_composites() {
        let mut registry = noop_registry(&["clean"]);
        registry
            .register_composite("a", Node::series(["clean", "b"]))
            .expect("a");
        registry
            .register_composite("b", Node::parallel(["a"]))
            .expect("b");

        let err = registry.validate(&Node::task("a")).unwrap_err();
        match err {
            TaskError::CyclicDependency { chain } => assert_eq!(chain, "a -> b -> a"),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn repeated_leaf_in_series_is_not_a_cycle() {
        let mut registry = noop_registry(&["reload"]);
        registry
            .register_composite("twice", Node::series(["reload", "reload"]))
            .expect("twice");
        registry.validate(&Node::task("twice")).expect("no cycle");
    }
}
