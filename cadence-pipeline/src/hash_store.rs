//! Hash store — SHA-256 change tracking for step outputs.
//!
//! One JSON document per step at `<project>/.cadence/hashes/<step>.json`.
//! Saved through `.tmp` + rename like every other file the build writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, PipelineError};

/// Output path string -> SHA-256 hex digest of the last bytes written there.
pub type HashStore = HashMap<String, String>;

/// On-disk payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashStoreFile {
    pub built_at: DateTime<Utc>,
    #[serde(default)]
    pub files: HashStore,
}

impl HashStoreFile {
    fn empty() -> Self {
        Self {
            built_at: Utc::now(),
            files: HashMap::new(),
        }
    }
}

/// `<state_dir>/hashes/`
pub fn hashes_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("hashes")
}

/// `<state_dir>/hashes/<step>.json`
pub fn store_path_at(state_dir: &Path, step: &str) -> PathBuf {
    hashes_dir(state_dir).join(format!("{step}.json"))
}

/// Load the store for `step`; empty if it was never saved.
///
/// A store that no longer parses is treated as empty so the next build
/// rewrites every output instead of failing.
pub fn load_at(state_dir: &Path, step: &str) -> Result<HashStoreFile, PipelineError> {
    let path = store_path_at(state_dir, step);
    if !path.exists() {
        return Ok(HashStoreFile::empty());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    match serde_json::from_str::<HashStoreFile>(&contents) {
        Ok(store) => Ok(store),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "discarding unreadable hash store");
            Ok(HashStoreFile::empty())
        }
    }
}

/// Save the store for `step` atomically.
pub fn save_at(state_dir: &Path, step: &str, store: &HashStoreFile) -> Result<(), PipelineError> {
    let path = store_path_at(state_dir, step);
    let dir = hashes_dir(state_dir);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let json = serde_json::to_string_pretty(store)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// Drop every step's store (used by `clean`).
pub fn clear_at(state_dir: &Path) -> Result<(), PipelineError> {
    let dir = hashes_dir(state_dir);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(&dir, e)),
    }
}
