//! cadence core library — task registry, composition, execution, config.
//!
//! - [`types`] — [`TaskName`] and friends
//! - [`node`] — [`Node`] series/parallel compositions
//! - [`registry`] — [`Registry`] of task bodies and named compositions
//! - [`executor`] — [`Executor`] that runs a [`Node`] against a registry
//! - [`config`] — `cadence.yaml` loading
//! - [`error`] — [`TaskError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod executor;
pub mod node;
pub mod registry;
pub mod types;

pub use config::{Config, Project};
pub use error::{ConfigError, TaskError};
pub use executor::Executor;
pub use node::Node;
pub use registry::{Registry, TaskBody, TaskEntry, TaskFuture};
pub use types::{TaskKind, TaskName};

// Re-exported so downstream crates share one token type.
pub use tokio_util::sync::CancellationToken;
