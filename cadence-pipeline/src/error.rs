//! Error types for cadence-pipeline.

use std::path::PathBuf;

use thiserror::Error;

use cadence_core::TaskError;
use cadence_renderer::RenderError;

/// All errors that can arise while running a pipeline step.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An error from the markup renderer.
    #[error("render error: {}", .0.detail())]
    Render(#[from] RenderError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An invalid glob pattern in the config.
    #[error("invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    /// A file the caller listed explicitly does not exist.
    #[error("missing input file {path}")]
    MissingInput { path: PathBuf },

    /// A transform rejected its input. `line` is 1-based when known.
    #[error("{stage} failed for {}{}: {message}", .path.display(), .line.map(|l| format!(":{l}")).unwrap_or_default())]
    Transform {
        stage: &'static str,
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    /// A `targets` entry that is not a recognised browser query.
    #[error("invalid browser targets: {0}")]
    Targets(String),

    /// JSON serialization/deserialization error (hash store).
    #[error("hash store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`PipelineError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PipelineError {
    PipelineError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`PipelineError::Transform`].
pub(crate) fn transform_err(
    stage: &'static str,
    path: impl Into<PathBuf>,
    line: Option<usize>,
    message: impl Into<String>,
) -> PipelineError {
    PipelineError::Transform {
        stage,
        path: path.into(),
        line,
        message: message.into(),
    }
}

impl From<PipelineError> for TaskError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Io { path, source } => TaskError::Io { path, source },
            PipelineError::Transform {
                stage,
                path,
                line,
                message,
            } => {
                let at = match line {
                    Some(line) => format!("{}:{line}", path.display()),
                    None => path.display().to_string(),
                };
                TaskError::transform(stage, format!("{at}: {message}"))
            }
            other => TaskError::transform("pipeline", other),
        }
    }
}
