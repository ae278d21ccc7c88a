//! # cadence-renderer
//!
//! Tera-based markup rendering: every HTML source is a template, with asset
//! URLs, build metadata and user `vars` in scope.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cadence_core::Config;
//! use cadence_renderer::{MarkupSource, Renderer, TemplateContext};
//!
//! fn render(config: &Config) {
//!     let sources = vec![MarkupSource::new("index.html", "<h1>{{ vars.title }}</h1>")];
//!     if let (Ok(renderer), Ok(ctx)) = (Renderer::new(&sources), TemplateContext::from_config(config)) {
//!         for (name, html) in renderer.render_all(&ctx).unwrap_or_default() {
//!             println!("{name}: {} bytes", html.len());
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::TemplateContext;
pub use engine::{is_partial, load_source, MarkupSource, Renderer};
pub use error::RenderError;
