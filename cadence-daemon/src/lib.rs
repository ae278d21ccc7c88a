//! # cadence-daemon
//!
//! Long-running sessions: the watch binder, the live-reload dev server and
//! the `watch` / `run` runtimes that combine them.

mod error;
pub mod runtime;
pub mod server;
pub mod watch;

pub use error::DaemonError;
pub use runtime::{build_registry, init_tracing, run_serve, run_watch, shutdown_token};
pub use server::{register_reload, Reloader};
pub use watch::{drive, WatchBinding, COALESCE_WINDOW};
