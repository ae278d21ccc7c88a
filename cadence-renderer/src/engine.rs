//! Tera rendering engine for markup sources.
//!
//! Every markup file under the markup root is loaded as a template so pages
//! can `{% include %}` or `{% extends %}` each other. Files whose path has a
//! component starting with `_` (e.g. `_layout.html`, `_partials/nav.html`)
//! are partials: loadable, never rendered as pages.
//!
//! Two built-in partials are always available:
//!
//! | Name                   | Emits                                      |
//! |------------------------|--------------------------------------------|
//! | `cadence/styles.html`  | one `<link rel="stylesheet">` per entry    |
//! | `cadence/scripts.html` | `<script src=...>` for the bundle          |

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use crate::context::TemplateContext;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates — baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    ("cadence/styles.html", include_str!("templates/styles.html.tera")),
    ("cadence/scripts.html", include_str!("templates/scripts.html.tera")),
];

/// One markup file: its name relative to the markup root and its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupSource {
    pub name: String,
    pub contents: String,
}

impl MarkupSource {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: normalize_template_name(Path::new(&name.into())),
            contents: contents.into(),
        }
    }

    pub fn is_partial(&self) -> bool {
        is_partial(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .trim_start_matches("./")
        .to_string()
}

/// `true` for `_layout.html`, `_partials/nav.html`, `blog/_card.html`.
pub fn is_partial(name: &str) -> bool {
    name.split('/').any(|part| part.starts_with('_'))
}

/// Read a template file from disk as a [`MarkupSource`] named relative to `root`.
pub fn load_source(root: &Path, path: &Path) -> Result<MarkupSource, RenderError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let rel = path.strip_prefix(root).unwrap_or(path);
    Ok(MarkupSource::new(rel.to_string_lossy(), contents))
}

fn build_tera(sources: &[MarkupSource]) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert((*name).to_string(), (*content).to_string());
    }
    for source in sources {
        templates.insert(source.name.clone(), source.contents.clone());
    }

    let mut tera = Tera::default();
    // Sources are trusted project files; escaping would mangle URLs ('/' -> "&#x2F;").
    tera.autoescape_on(vec![]);
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Tera-based renderer over one set of markup sources.
///
/// Create once per build with every source (pages and partials) and reuse.
pub struct Renderer {
    tera: Tera,
    pages: Vec<String>,
}

impl Renderer {
    pub fn new(sources: &[MarkupSource]) -> Result<Self, RenderError> {
        let tera = build_tera(sources)?;
        let mut pages: Vec<String> = sources
            .iter()
            .filter(|s| !s.is_partial())
            .map(|s| s.name.clone())
            .collect();
        pages.sort();
        pages.dedup();
        Ok(Renderer { tera, pages })
    }

    /// Names of renderable pages, sorted.
    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    /// Render page `name` with `ctx` rebased onto that page.
    pub fn render_page(&self, name: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
        let tera_ctx = ctx.for_page(name).to_tera_context()?;
        Ok(self.tera.render(name, &tera_ctx)?)
    }

    /// Render every page. Returns `(name, html)` in page order.
    pub fn render_all(&self, ctx: &TemplateContext) -> Result<Vec<(String, String)>, RenderError> {
        self.pages
            .iter()
            .map(|name| Ok((name.clone(), self.render_page(name, ctx)?)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
