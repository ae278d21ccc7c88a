//! Built-in tasks: one leaf per pipeline step plus the `build` and
//! `default` compositions.
//!
//! | Task      | Reads (under `source`)         | Writes (under `output`)    |
//! |-----------|--------------------------------|----------------------------|
//! | `clean`   |                                | removes everything         |
//! | `vendor`  | `vendor[].src` (project root)  | `vendor[].dest/<file>`     |
//! | `markup`  | `markup.root` / `patterns`     | `markup.dest`              |
//! | `styles`  | `styles.root` / `entries`      | `styles.dest/*.css`        |
//! | `scripts` | `scripts.root` / `files`       | `scripts.dest/<bundle>`    |
//! | `static`  | `static.root` / `patterns`     | `static.dest`              |
//! | `sprite`  | `sprite.root` / `patterns`     | `sprite.dest`              |
//!
//! Step bodies are synchronous file work, so each leaf runs its step on
//! the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadence_core::config::config_path_at;
use cadence_core::{Node, Project, Registry, TaskError, TaskName};
use cadence_renderer::TemplateContext;

use crate::error::{io_err, PipelineError};
use crate::hash_store;
use crate::source::Source;
use crate::step::{Step, StepContext, StepReport};
use crate::targets::Targets;
use crate::writer::WriteResult;
use crate::transforms::{
    Autoprefix, Concat, CssMinify, HtmlMinify, HtmlTemplate, ScriptMinify, ScssCompile, SvgSprite,
};

/// Order of the `build` composition.
pub const BUILD_SEQUENCE: [&str; 7] = ["clean", "vendor", "markup", "styles", "scripts", "static", "sprite"];

/// Partials are loaded for `{% include %}` even when the page patterns
/// would not match them.
const PARTIAL_PATTERNS: [&str; 2] = ["**/_*.html", "**/_*/**/*.html"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Report what would be written, touch nothing.
    pub dry_run: bool,
    /// Rendering for the dev server (`meta.dev` in templates).
    pub dev: bool,
}

fn describe(name: &str) -> &'static str {
    match name {
        "clean" => "Remove the output directory and build hashes",
        "vendor" => "Copy vendor files into the output",
        "markup" => "Render HTML templates",
        "styles" => "Compile SCSS, add vendor prefixes, minify",
        "scripts" => "Bundle and minify scripts",
        "static" => "Copy static files",
        "sprite" => "Combine SVG icons into one sprite",
        _ => "",
    }
}

/// Register every built-in leaf, `build` and (unless the config defines
/// its own) `default`.
pub fn register_builtin(
    registry: &mut Registry,
    project: Arc<Project>,
    options: BuildOptions,
) -> Result<(), TaskError> {
    for name in BUILD_SEQUENCE {
        let project = Arc::clone(&project);
        registry.register(name, move || {
            let project = Arc::clone(&project);
            async move {
                tokio::task::spawn_blocking(move || run_builtin(&project, name, options))
                    .await
                    .map_err(|e| TaskError::transform(name, format!("step worker failed: {e}")))??;
                Ok::<(), TaskError>(())
            }
        })?;
        registry.describe(name, describe(name));
    }

    registry.register_composite("build", build_node())?;
    registry.describe("build", "Clean, then run every step in order");

    let default = TaskName::from("default");
    if !project.config.tasks.contains_key(&default) {
        registry.register_composite(default.clone(), Node::task("build"))?;
        registry.describe(default, "Alias for build");
    }
    Ok(())
}

/// Register the `tasks:` compositions from `cadence.yaml`.
pub fn register_config_tasks(registry: &mut Registry, project: &Project) -> Result<(), TaskError> {
    for (name, node) in &project.config.tasks {
        registry.register_composite(name.clone(), node.clone())?;
        registry.describe(name.clone(), format!("{node}"));
    }
    Ok(())
}

/// `clean -> vendor -> markup -> styles -> scripts -> static -> sprite`
pub fn build_node() -> Node {
    Node::series(BUILD_SEQUENCE)
}

/// Run built-in `name` synchronously.
pub fn run_builtin(project: &Project, name: &str, options: BuildOptions) -> Result<(), PipelineError> {
    if name == "clean" {
        return clean(project, options.dry_run);
    }
    match builtin_step(project, name, options)? {
        Some(step) => {
            let ctx = StepContext {
                state_dir: project.state_dir(),
                dry_run: options.dry_run,
            };
            let report: StepReport = step.run(&ctx)?;
            if options.dry_run {
                for result in report
                    .results
                    .iter()
                    .filter(|r| matches!(r, WriteResult::WouldWrite { .. }))
                {
                    tracing::info!(step = name, path = %result.path().display(), "[dry-run] would write");
                }
            }
            Ok(())
        }
        None => {
            tracing::info!(step = name, "nothing to do");
            Ok(())
        }
    }
}

/// The step behind built-in `name`. `None` for `sprite` while disabled and
/// for names that are not steps.
pub fn builtin_step(project: &Project, name: &str, options: BuildOptions) -> Result<Option<Step>, PipelineError> {
    let config = &project.config;
    let src = project.source_dir();
    let out = project.output_dir();

    let step = match name {
        "vendor" => {
            let files = config
                .vendor
                .iter()
                .map(|v| {
                    let input = project.root.join(&v.src);
                    let file_name = input
                        .file_name()
                        .map(PathBuf::from)
                        .ok_or_else(|| PipelineError::MissingInput { path: input.clone() })?;
                    Ok((input, v.dest.join(file_name)))
                })
                .collect::<Result<Vec<_>, PipelineError>>()?;
            Step::new("vendor", Source::Files(files), out)
        }
        "markup" => {
            let mut patterns = config.markup.patterns.clone();
            patterns.extend(PARTIAL_PATTERNS.iter().map(|p| p.to_string()));
            let mut context = TemplateContext::from_config(config)?;
            context.meta.dev = options.dev;

            let step = Step::new(
                "markup",
                Source::glob(src.join(&config.markup.root), &patterns),
                out.join(&config.markup.dest),
            )
            .pipe(HtmlTemplate::new(context));
            if config.markup.minify {
                step.pipe(HtmlMinify)
            } else {
                step
            }
        }
        "styles" => {
            let root = src.join(&config.styles.root);
            let entries: Vec<String> = config
                .styles
                .entries
                .iter()
                .map(|e| e.to_string_lossy().into_owned())
                .collect();
            let targets = Targets::parse(&config.targets).map_err(|e| match e {
                PipelineError::Targets(message) => PipelineError::Targets(format!(
                    "{message} (in {})",
                    config_path_at(&project.root).display()
                )),
                other => other,
            })?;

            let step = Step::new(
                "styles",
                Source::ordered(&root, &entries),
                out.join(&config.styles.dest),
            )
            .pipe(ScssCompile::new(vec![root]))
            .pipe(Autoprefix::new(targets));
            if config.styles.minify {
                step.pipe(CssMinify)
            } else {
                step
            }
        }
        "scripts" => {
            let step = Step::new(
                "scripts",
                Source::ordered(src.join(&config.scripts.root), &config.scripts.files),
                out.join(&config.scripts.dest),
            )
            .pipe(Concat::new(&config.scripts.bundle, "\n"));
            if config.scripts.minify {
                step.pipe(ScriptMinify)
            } else {
                step
            }
        }
        "static" => Step::new(
            "static",
            Source::glob(src.join(&config.static_files.root), &config.static_files.patterns),
            out.join(&config.static_files.dest),
        ),
        "sprite" if config.sprite.enabled => Step::new(
            "sprite",
            Source::glob(src.join(&config.sprite.root), &config.sprite.patterns),
            out,
        )
        .pipe(SvgSprite::new(&config.sprite.dest, &config.sprite.id_prefix)),
        _ => return Ok(None),
    };
    Ok(Some(step))
}

/// Remove the output directory and every step's hash store.
pub fn clean(project: &Project, dry_run: bool) -> Result<(), PipelineError> {
    let out = project.output_dir();
    if dry_run {
        tracing::info!(path = %out.display(), "[dry-run] would remove");
        return Ok(());
    }
    remove_dir(&out)?;
    hash_store::clear_at(&project.state_dir())?;
    tracing::info!(path = %out.display(), "cleaned");
    Ok(())
}

fn remove_dir(path: &Path) -> Result<(), PipelineError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

/// A directory tree whose changes should re-run one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSpec {
    pub task: TaskName,
    pub root: PathBuf,
    pub patterns: Vec<String>,
}

/// What `watch` and `run` observe: each step's inputs, mapped to the step.
pub fn watch_specs(project: &Project) -> Vec<WatchSpec> {
    let config = &project.config;
    let src = project.source_dir();
    let spec = |task: &str, root: &Path, patterns: Vec<String>| WatchSpec {
        task: TaskName::from(task),
        root: src.join(root),
        patterns,
    };

    let mut markup = config.markup.patterns.clone();
    markup.extend(PARTIAL_PATTERNS.iter().map(|p| p.to_string()));

    let mut specs = vec![
        spec("markup", &config.markup.root, markup),
        spec("styles", &config.styles.root, config.styles.watch.clone()),
        spec("scripts", &config.scripts.root, config.scripts.files.clone()),
        spec("static", &config.static_files.root, config.static_files.patterns.clone()),
    ];
    if config.sprite.enabled {
        specs.push(spec("sprite", &config.sprite.root, config.sprite.patterns.clone()));
    }
    specs
}
