//! # cadence-pipeline
//!
//! File pipelines: a [`Source`] is read into [`Asset`]s, passed through
//! [`Transform`]s, and written to a destination directory with hash-gated
//! atomic writes. [`tasks`] wires the built-in steps into a
//! [`cadence_core::Registry`].
//!
//! Outputs are only written once every transform of a step succeeds, so a
//! failed compile leaves the previous output in place.

pub mod css;
pub mod error;
pub mod hash_store;
pub mod source;
pub mod step;
pub mod targets;
pub mod tasks;
pub mod transforms;
pub mod writer;

pub use error::PipelineError;
pub use source::Source;
pub use step::{Asset, Step, StepContext, StepReport, Transform};
pub use targets::Targets;
pub use tasks::{register_builtin, register_config_tasks, watch_specs, BuildOptions, WatchSpec};
pub use writer::WriteResult;
