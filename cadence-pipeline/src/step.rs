//! Pipeline steps: read a [`Source`], run every [`Transform`] in memory,
//! then write the results through the hash-gated writer.
//!
//! Nothing touches the output tree until the last transform has succeeded,
//! so a failing compile leaves the previous outputs in place.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;

use crate::error::{io_err, transform_err, PipelineError};
use crate::hash_store;
use crate::source::Source;
use crate::writer::{atomic_write, WriteResult};

/// One in-memory file flowing through a step.
#[derive(Clone, PartialEq, Eq)]
pub struct Asset {
    /// Output path, relative to the step's destination.
    pub path: PathBuf,
    pub contents: Vec<u8>,
    /// File the asset was read from, for error messages and relative imports.
    pub origin: Option<PathBuf>,
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("path", &self.path)
            .field("bytes", &self.contents.len())
            .field("origin", &self.origin)
            .finish()
    }
}

impl Asset {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            origin: None,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>, contents: Vec<u8>, origin: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents,
            origin: Some(origin.into()),
        }
    }

    /// Where to point at in errors: the origin if known, else the output path.
    pub fn display_path(&self) -> &Path {
        self.origin.as_deref().unwrap_or(&self.path)
    }

    /// Contents as UTF-8, or a `Transform` error naming `stage`.
    pub fn text(&self, stage: &'static str) -> Result<&str, PipelineError> {
        std::str::from_utf8(&self.contents)
            .map_err(|e| transform_err(stage, self.display_path(), None, format!("not UTF-8: {e}")))
    }

    /// Same asset, new contents.
    pub fn with_text(mut self, text: String) -> Self {
        self.contents = text.into_bytes();
        self
    }

    /// Same asset, new extension (e.g. `style.scss` -> `style.css`).
    pub fn with_extension(mut self, ext: &str) -> Self {
        self.path.set_extension(ext);
        self
    }
}

/// A 1:1 or N:1 rewrite of the assets in a step.
pub trait Transform: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, PipelineError>;
}

/// Applies `f` to each asset's text, one at a time.
pub(crate) fn map_text<F>(stage: &'static str, assets: Vec<Asset>, mut f: F) -> Result<Vec<Asset>, PipelineError>
where
    F: FnMut(&Asset, &str) -> Result<String, PipelineError>,
{
    assets
        .into_iter()
        .map(|asset| {
            let out = f(&asset, asset.text(stage)?)?;
            Ok(asset.with_text(out))
        })
        .collect()
}

/// Per-run settings shared by every step.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// `<project>/.cadence`
    pub state_dir: PathBuf,
    pub dry_run: bool,
}

/// What a step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: String,
    pub results: Vec<WriteResult>,
    /// Outputs of an earlier run with no source left; removed unless dry-run.
    pub pruned: Vec<PathBuf>,
}

impl StepReport {
    pub fn written(&self) -> usize {
        self.results.iter().filter(|r| r.is_written()).count()
    }

    pub fn unchanged(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, WriteResult::Unchanged { .. }))
            .count()
    }
}

/// Source -> transforms -> destination directory.
pub struct Step {
    pub name: String,
    pub source: Source,
    pub transforms: Vec<Box<dyn Transform>>,
    pub dest: PathBuf,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("source", &self.source)
            .field(
                "transforms",
                &self.transforms.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("dest", &self.dest)
            .finish()
    }
}

impl Step {
    pub fn new(name: impl Into<String>, source: Source, dest: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source,
            transforms: Vec::new(),
            dest: dest.into(),
        }
    }

    /// Append a transform.
    pub fn pipe(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Read, transform, then write. Outputs are only written once every
    /// transform has succeeded.
    pub fn run(&self, ctx: &StepContext) -> Result<StepReport, PipelineError> {
        let started = Instant::now();
        let mut assets = self.source.read()?;
        let inputs = assets.len();
        for transform in &self.transforms {
            assets = transform.apply(assets)?;
        }

        let mut store = hash_store::load_at(&ctx.state_dir, &self.name)?;
        let mut results = Vec::with_capacity(assets.len());
        for asset in &assets {
            let path = self.dest.join(&asset.path);
            results.push(atomic_write(&path, &asset.contents, &mut store.files, ctx.dry_run)?);
        }

        let current: HashSet<String> = results
            .iter()
            .map(|r| r.path().to_string_lossy().to_string())
            .collect();
        let pruned = self.prune(&mut store.files, &current, ctx.dry_run)?;

        let report = StepReport {
            step: self.name.clone(),
            results,
            pruned,
        };
        if !ctx.dry_run && (report.written() > 0 || !report.pruned.is_empty()) {
            store.built_at = Utc::now();
            hash_store::save_at(&ctx.state_dir, &self.name, &store)?;
        }

        tracing::info!(
            step = %self.name,
            inputs,
            written = report.written(),
            unchanged = report.unchanged(),
            pruned = report.pruned.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "step finished"
        );
        Ok(report)
    }
}

impl Step {
    /// Remove outputs recorded in `store` that this run no longer produced.
    /// Only paths under the step's destination are touched.
    fn prune(
        &self,
        store: &mut hash_store::HashStore,
        current: &HashSet<String>,
        dry_run: bool,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let mut stale: Vec<String> = store
            .keys()
            .filter(|key| !current.contains(*key) && Path::new(key).starts_with(&self.dest))
            .cloned()
            .collect();
        stale.sort();

        let mut pruned = Vec::with_capacity(stale.len());
        for key in stale {
            let path = PathBuf::from(&key);
            if dry_run {
                tracing::info!(step = %self.name, path = %path.display(), "[dry-run] would remove stale output");
            } else {
                match std::fs::remove_file(&path) {
                    Ok(()) => tracing::debug!(step = %self.name, path = %path.display(), "removed stale output"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(io_err(&path, e)),
                }
                store.remove(&key);
            }
            pruned.push(path);
        }
        Ok(pruned)
    }
}
