//! Error types for cadence-core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::TaskName;

/// Errors produced while registering, validating or running tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A composition or run referenced a name that was never registered.
    #[error("unknown task '{name}'")]
    UnknownTask { name: TaskName },

    /// `register` was called twice for the same name.
    #[error("task '{name}' is already registered")]
    DuplicateTask { name: TaskName },

    /// A composite task expands back into itself.
    #[error("cyclic task dependency: {chain}")]
    CyclicDependency { chain: String },

    /// A pipeline stage rejected its input (e.g. malformed source).
    #[error("{stage}: {message}")]
    Transform { stage: String, message: String },

    /// Read, write or watch failure, annotated with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A task body failed; carries the originating task name.
    #[error("task '{task}' failed: {source}")]
    Failed {
        task: TaskName,
        #[source]
        source: Box<TaskError>,
    },

    /// Several parallel branches failed. `first` completed first.
    #[error("{first} (+{} more parallel failure(s))", rest.len())]
    Aggregate {
        first: Box<TaskError>,
        rest: Vec<TaskError>,
    },

    /// The run was cancelled before this task could finish.
    #[error("run cancelled")]
    Cancelled,
}

impl TaskError {
    /// Build a [`TaskError::Transform`] from any displayable message.
    pub fn transform(stage: impl Into<String>, message: impl fmt::Display) -> Self {
        TaskError::Transform {
            stage: stage.into(),
            message: message.to_string(),
        }
    }

    /// Name of the innermost task that failed, if one is recorded.
    pub fn origin(&self) -> Option<&TaskName> {
        match self {
            TaskError::Failed { task, source } => source.origin().or(Some(task)),
            TaskError::Aggregate { first, .. } => first.origin(),
            TaskError::UnknownTask { name } | TaskError::DuplicateTask { name } => Some(name),
            _ => None,
        }
    }

    /// Number of individual failures this error stands for.
    pub fn failure_count(&self) -> usize {
        match self {
            TaskError::Aggregate { first, rest } => {
                first.failure_count() + rest.iter().map(TaskError::failure_count).sum::<usize>()
            }
            _ => 1,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            TaskError::Cancelled => true,
            TaskError::Failed { source, .. } => source.is_cancelled(),
            TaskError::Aggregate { first, rest } => {
                first.is_cancelled() && rest.iter().all(TaskError::is_cancelled)
            }
            _ => false,
        }
    }
}

/// Errors raised while loading or saving `cadence.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with path and serde_yaml line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The file parsed but describes something unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub(crate) fn config_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`TaskError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TaskError {
    TaskError::Io {
        path: path.into(),
        source,
    }
}
