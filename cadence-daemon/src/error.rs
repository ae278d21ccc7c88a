use thiserror::Error;

use cadence_core::TaskError;
use cadence_pipeline::PipelineError;

/// Error surface for the watcher, dev server and runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("could not bind dev server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dev server at {addr} failed: {source}")]
    Serve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}
