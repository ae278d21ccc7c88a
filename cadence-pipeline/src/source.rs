//! Where a step's inputs come from.
//!
//! Filesystem enumeration order is not stable, so glob expansions are
//! always sorted by their root-relative path. [`Source::Ordered`] keeps the
//! caller's order instead (script bundles depend on it).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{io_err, PipelineError};
use crate::step::Asset;
use crate::writer::TMP_SUFFIX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Every file under `root` matching any pattern, sorted.
    Glob { root: PathBuf, patterns: Vec<String> },
    /// Each entry is a file or a glob expanded in place. First occurrence
    /// wins when entries overlap.
    Ordered { root: PathBuf, entries: Vec<String> },
    /// Explicit `(absolute input, relative output)` pairs. Every input must
    /// exist.
    Files(Vec<(PathBuf, PathBuf)>),
}

impl Source {
    pub fn glob(root: impl Into<PathBuf>, patterns: &[String]) -> Self {
        Source::Glob {
            root: root.into(),
            patterns: patterns.to_vec(),
        }
    }

    pub fn ordered(root: impl Into<PathBuf>, entries: &[String]) -> Self {
        Source::Ordered {
            root: root.into(),
            entries: entries.to_vec(),
        }
    }

    /// Resolve to `(absolute, relative)` pairs without reading contents.
    pub fn resolve(&self) -> Result<Vec<(PathBuf, PathBuf)>, PipelineError> {
        match self {
            Source::Glob { root, patterns } => {
                let set = build_globset(patterns)?;
                Ok(walk_files(root)?
                    .into_iter()
                    .filter(|rel| set.is_match(rel))
                    .map(|rel| (root.join(&rel), rel))
                    .collect())
            }
            Source::Ordered { root, entries } => resolve_ordered(root, entries),
            Source::Files(files) => files
                .iter()
                .map(|(abs, rel)| {
                    if !abs.is_file() {
                        return Err(PipelineError::MissingInput { path: abs.clone() });
                    }
                    Ok((abs.clone(), rel.clone()))
                })
                .collect(),
        }
    }

    /// Resolve and read every input.
    pub fn read(&self) -> Result<Vec<Asset>, PipelineError> {
        self.resolve()?
            .into_iter()
            .map(|(abs, rel)| {
                let contents = std::fs::read(&abs).map_err(|e| io_err(&abs, e))?;
                Ok(Asset::from_file(rel, contents, abs))
            })
            .collect()
    }
}

/// `true` when `entry` contains glob metacharacters.
pub fn is_glob(entry: &str) -> bool {
    entry.contains(['*', '?', '[', '{'])
}

/// Compile `patterns` so `*` never crosses a `/`.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet, PipelineError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern.trim_start_matches("./"))
                .literal_separator(true)
                .build()?,
        );
    }
    Ok(builder.build()?)
}

fn resolve_ordered(root: &Path, entries: &[String]) -> Result<Vec<(PathBuf, PathBuf)>, PipelineError> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut out = Vec::new();
    let mut all_files: Option<Vec<PathBuf>> = None;

    for entry in entries {
        let matched: Vec<PathBuf> = if is_glob(entry) {
            let set = build_globset(std::slice::from_ref(entry))?;
            if all_files.is_none() {
                all_files = Some(walk_files(root)?);
            }
            all_files
                .iter()
                .flatten()
                .filter(|rel| set.is_match(rel))
                .cloned()
                .collect()
        } else {
            let rel = PathBuf::from(entry.trim_start_matches("./"));
            let abs = root.join(&rel);
            if !abs.is_file() {
                return Err(PipelineError::MissingInput { path: abs });
            }
            vec![rel]
        };

        for rel in matched {
            if seen.insert(rel.clone()) {
                out.push((root.join(&rel), rel));
            }
        }
    }
    Ok(out)
}

/// Every regular file below `root`, relative to it, sorted. A missing root
/// is an empty tree.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    if root.is_dir() {
        collect_files(root, Path::new(""), &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn collect_files(dir: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> Result<(), PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(TMP_SUFFIX) {
            continue;
        }
        let path = entry.path();
        let child = rel.join(&name);
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
        if file_type.is_dir() {
            collect_files(&path, &child, out)?;
        } else if path.is_file() {
            out.push(child);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn rels(pairs: Vec<(PathBuf, PathBuf)>) -> Vec<String> {
        pairs
            .into_iter()
            .map(|(_, rel)| rel.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn glob_matches_are_sorted_and_star_stays_in_one_directory() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.html", "");
        touch(dir.path(), "a.html", "");
        touch(dir.path(), "blog/post.html", "");
        touch(dir.path(), "notes.txt", "");

        let top = Source::glob(dir.path(), &["*.html".to_string()]);
        assert_eq!(rels(top.resolve().unwrap()), ["a.html", "b.html"]);

        let deep = Source::glob(dir.path(), &["**/*.html".to_string()]);
        assert_eq!(rels(deep.resolve().unwrap()), ["a.html", "b.html", "blog/post.html"]);
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let source = Source::glob(dir.path().join("nope"), &["**/*".to_string()]);
        assert!(source.read().unwrap().is_empty());
    }

    #[test]
    fn ordered_entries_keep_caller_order_and_dedupe() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.js", "A;");
        touch(dir.path(), "b.js", "B;");
        touch(dir.path(), "vendor/z.js", "Z;");

        let source = Source::ordered(
            dir.path(),
            &["vendor/z.js".to_string(), "b.js".to_string(), "**/*.js".to_string()],
        );
        assert_eq!(rels(source.resolve().unwrap()), ["vendor/z.js", "b.js", "a.js"]);
    }

    #[test]
    fn ordered_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let source = Source::ordered(dir.path(), &["missing.js".to_string()]);
        assert!(matches!(source.resolve(), Err(PipelineError::MissingInput { .. })));
    }

    #[test]
    fn temp_files_are_never_inputs() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "index.html", "");
        touch(dir.path(), "index.html.cadence.tmp", "");
        assert_eq!(walk_files(dir.path()).unwrap(), [PathBuf::from("index.html")]);
    }

    #[test]
    fn files_source_maps_inputs_to_given_outputs() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "node_modules/normalize.css/normalize.css", "html{}");
        let source = Source::Files(vec![(
            dir.path().join("node_modules/normalize.css/normalize.css"),
            PathBuf::from("vendor/normalize.css"),
        )]);
        let assets = source.read().unwrap();
        assert_eq!(assets[0].path, PathBuf::from("vendor/normalize.css"));
        assert_eq!(assets[0].contents, b"html{}");

        let missing = Source::Files(vec![(dir.path().join("gone.js"), PathBuf::from("gone.js"))]);
        assert!(matches!(missing.read(), Err(PipelineError::MissingInput { .. })));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = build_globset(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::Glob(_)));
    }
}
