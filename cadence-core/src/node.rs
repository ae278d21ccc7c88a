//! Composition nodes: series and parallel groupings of named tasks.
//!
//! Nodes are plain data. Building one performs no lookups, so leaves may
//! name tasks that are registered later; resolution happens in
//! [`Registry::validate`](crate::registry::Registry::validate) and at run time.
//!
//! In YAML a node is either a bare task name or a one-key mapping:
//!
//! ```yaml
//! build:
//!   series:
//!     - clean
//!     - parallel: [markup, styles, scripts]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::TaskName;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "NodeRepr", into = "NodeRepr")]
pub enum Node {
    /// A single named task.
    Leaf(TaskName),
    /// Children run one after another, in order.
    Series(Vec<Node>),
    /// Children start together; complete when all are complete.
    Parallel(Vec<Node>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum NodeRepr {
    Leaf(TaskName),
    Series { series: Vec<Node> },
    Parallel { parallel: Vec<Node> },
}

impl From<NodeRepr> for Node {
    fn from(repr: NodeRepr) -> Self {
        match repr {
            NodeRepr::Leaf(name) => Node::Leaf(name),
            NodeRepr::Series { series } => Node::Series(series),
            NodeRepr::Parallel { parallel } => Node::Parallel(parallel),
        }
    }
}

impl From<Node> for NodeRepr {
    fn from(node: Node) -> Self {
        match node {
            Node::Leaf(name) => NodeRepr::Leaf(name),
            Node::Series(series) => NodeRepr::Series { series },
            Node::Parallel(parallel) => NodeRepr::Parallel { parallel },
        }
    }
}

impl Node {
    pub fn task(name: impl Into<TaskName>) -> Self {
        Node::Leaf(name.into())
    }

    /// Sequential composition; argument order is execution order.
    pub fn series<I>(nodes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        Node::Series(nodes.into_iter().map(Into::into).collect())
    }

    /// Concurrent composition; no ordering between children.
    pub fn parallel<I>(nodes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        Node::Parallel(nodes.into_iter().map(Into::into).collect())
    }

    /// Every leaf name, in declaration order.
    pub fn leaves(&self) -> Vec<&TaskName> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a TaskName>) {
        match self {
            Node::Leaf(name) => out.push(name),
            Node::Series(children) | Node::Parallel(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }
}

impl From<&str> for Node {
    fn from(name: &str) -> Self {
        Node::task(name)
    }
}

impl From<TaskName> for Node {
    fn from(name: TaskName) -> Self {
        Node::Leaf(name)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Leaf(name) => write!(f, "{name}"),
            Node::Series(children) => write_joined(f, children, " -> ", false),
            Node::Parallel(children) => write_joined(f, children, " | ", true),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    children: &[Node],
    sep: &str,
    parallel: bool,
) -> fmt::Result {
    if children.is_empty() {
        return write!(f, "()");
    }
    if parallel && children.len() > 1 {
        write!(f, "(")?;
    }
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        // Parenthesise nested series inside a parallel group and vice versa.
        match child {
            Node::Series(inner) if parallel && inner.len() > 1 => write!(f, "({child})")?,
            _ => write!(f, "{child}")?,
        }
    }
    if parallel && children.len() > 1 {
        write!(f, ")")?;
    }
    Ok(())
}
