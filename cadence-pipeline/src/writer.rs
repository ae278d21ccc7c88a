//! Hash-gated atomic writer.
//!
//! ## `atomic_write`
//!
//! 1. SHA-256 the bytes.
//! 2. Compare with the step's stored hash; skip if identical and the file
//!    is still on disk.
//! 3. Dry run stops here.
//! 4. Write `<path>.cadence.tmp`, then rename over `<path>`.
//! 5. Record the new hash (the caller saves the store).
//!
//! A reader of the output tree never sees a half-written file: either the
//! previous bytes or the new ones.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{io_err, PipelineError};
use crate::hash_store::HashStore;

/// Suffix of in-flight temp files. Sources carrying it are ignored.
pub const TMP_SUFFIX: &str = ".cadence.tmp";

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// Bytes changed or the file did not exist.
    Written { path: PathBuf },
    /// Bytes match the stored hash and the file is present.
    Unchanged { path: PathBuf },
    /// `--dry-run`: the file *would* have been written.
    WouldWrite { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path }
            | WriteResult::Unchanged { path }
            | WriteResult::WouldWrite { path } => path,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, WriteResult::Written { .. })
    }
}

pub fn tmp_path_for(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}{TMP_SUFFIX}", path.display()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Atomically write `bytes` to `path`, gated on `store`.
pub fn atomic_write(
    path: &Path,
    bytes: &[u8],
    store: &mut HashStore,
    dry_run: bool,
) -> Result<WriteResult, PipelineError> {
    atomic_write_with_tmp(path, bytes, store, dry_run, &tmp_path_for(path))
}

fn atomic_write_with_tmp(
    path: &Path,
    bytes: &[u8],
    store: &mut HashStore,
    dry_run: bool,
    tmp: &Path,
) -> Result<WriteResult, PipelineError> {
    let digest = sha256_hex(bytes);

    let key = path.to_string_lossy().to_string();
    if store.get(&key) == Some(&digest) && path.is_file() {
        tracing::debug!(path = %path.display(), "unchanged");
        return Ok(WriteResult::Unchanged {
            path: path.to_path_buf(),
        });
    }

    if dry_run {
        tracing::info!(path = %path.display(), "[dry-run] would write");
        return Ok(WriteResult::WouldWrite {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, bytes).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    store.insert(key, digest);
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote");
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn write_bytes(path: &Path, bytes: &[u8]) -> WriteResult {
        let mut store = HashMap::new();
        atomic_write(path, bytes, &mut store, false).unwrap()
    }

    #[test]
    fn first_write_returns_written() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.html");
        let result = write_bytes(&path, b"<p>hi</p>");
        assert!(result.is_written());
        assert_eq!(fs::read(&path).unwrap(), b"<p>hi</p>");
    }

    #[test]
    fn same_bytes_twice_is_unchanged() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("main.js");
        let mut store = HashMap::new();
        atomic_write(&path, b"A;B;", &mut store, false).unwrap();
        let result = atomic_write(&path, b"A;B;", &mut store, false).unwrap();
        assert!(matches!(result, WriteResult::Unchanged { .. }));
    }

    #[test]
    fn deleted_output_is_rewritten_despite_matching_hash() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("style.css");
        let mut store = HashMap::new();
        atomic_write(&path, b"a{}", &mut store, false).unwrap();
        fs::remove_file(&path).unwrap();

        let result = atomic_write(&path, b"a{}", &mut store, false).unwrap();
        assert!(result.is_written());
        assert!(path.exists());
    }

    #[test]
    fn changed_bytes_are_written() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("main.js");
        let mut store = HashMap::new();
        atomic_write(&path, b"v1", &mut store, false).unwrap();
        let result = atomic_write(&path, b"v2", &mut store, false).unwrap();
        assert!(result.is_written());
        assert_eq!(fs::read(&path).unwrap(), b"v2");
    }

    #[test]
    fn dry_run_does_not_write_file_or_hash() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.css");
        let mut store = HashMap::new();
        let result = atomic_write(&path, b"x", &mut store, true).unwrap();
        assert!(matches!(result, WriteResult::WouldWrite { .. }));
        assert!(!path.exists(), "dry-run must not create files");
        assert!(store.is_empty());
    }

    #[test]
    fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("clean.html");
        write_bytes(&path, b"data");
        assert!(!tmp_path_for(&path).exists(), ".cadence.tmp must be cleaned up");
    }

    #[test]
    fn creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("images").join("icons").join("sprite.svg");
        write_bytes(&path, b"<svg/>");
        assert!(path.exists());
    }

    #[test]
    fn rename_failure_leaves_target_and_cleans_tmp() {
        let root = TempDir::new().unwrap();
        // A non-empty directory can never be replaced by a file rename.
        let path = root.path().join("occupied");
        fs::create_dir_all(path.join("keep")).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join("occupied.cadence.tmp");

        let mut store = HashMap::new();
        let err = atomic_write_with_tmp(&path, b"new content", &mut store, false, &tmp_path)
            .expect_err("rename onto a non-empty directory should fail");
        assert!(matches!(err, PipelineError::Io { .. }));

        assert!(path.join("keep").is_dir(), "target should be intact");
        assert!(!tmp_path.exists(), ".cadence.tmp should be cleaned up");
        assert!(store.is_empty(), "failed writes must not record a hash");
    }
}
