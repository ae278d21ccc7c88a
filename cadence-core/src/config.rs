//! Project configuration — `cadence.yaml` at the project root.
//!
//! Every field has a default, so an empty or missing file describes the
//! conventional layout:
//!
//! ```text
//! <project>/
//!   cadence.yaml
//!   src/
//!     index.html          markup (root of the output)
//!     scss/style.scss     styles  -> dist/styles/style.css
//!     js/**/*.js          scripts -> dist/scripts/main.js
//!     static/**           copied verbatim into dist/
//!     icons/*.svg         sprite  -> dist/images/sprite.svg (when enabled)
//!   dist/                 output (removed by `clean`)
//!   .cadence/             hash stores
//! ```
//!
//! # API pattern
//!
//! Like the rest of the workspace, filesystem entry points take an explicit
//! root (`load_at`, `save_at`) so tests can point them at a `TempDir`.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{config_io_err, ConfigError};
use crate::node::Node;
use crate::types::TaskName;

pub const CONFIG_FILE: &str = "cadence.yaml";
pub const STATE_DIR: &str = ".cadence";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source tree, relative to the project root.
    pub source: PathBuf,
    /// Output tree, relative to the project root.
    pub output: PathBuf,
    /// Browser compatibility matrix, browserslist style.
    pub targets: Vec<String>,
    pub markup: MarkupConfig,
    pub styles: StylesConfig,
    pub scripts: ScriptsConfig,
    #[serde(rename = "static")]
    pub static_files: StaticConfig,
    /// External files imported into the output as-is.
    pub vendor: Vec<VendorAsset>,
    pub sprite: SpriteConfig,
    pub server: ServerConfig,
    pub watch: WatchConfig,
    /// Extra named compositions, e.g. `default: build`.
    pub tasks: BTreeMap<TaskName, Node>,
}

/// HTML templates rendered into the output root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkupConfig {
    pub root: PathBuf,
    pub patterns: Vec<String>,
    pub dest: PathBuf,
    pub minify: bool,
    /// Free-form values exposed to templates as `vars.*`.
    pub vars: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StylesConfig {
    pub root: PathBuf,
    /// Entry stylesheets; one CSS file is produced per entry.
    pub entries: Vec<PathBuf>,
    /// Globs that trigger a style rebuild when watched.
    pub watch: Vec<String>,
    pub dest: PathBuf,
    pub minify: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    pub root: PathBuf,
    /// Files or globs, concatenated in exactly this order.
    pub files: Vec<String>,
    pub bundle: String,
    pub dest: PathBuf,
    pub minify: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticConfig {
    pub root: PathBuf,
    pub patterns: Vec<String>,
    pub dest: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorAsset {
    /// Relative to the project root (e.g. `node_modules/normalize.css/normalize.css`).
    pub src: PathBuf,
    /// Directory inside the output tree.
    pub dest: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpriteConfig {
    pub enabled: bool,
    pub root: PathBuf,
    pub patterns: Vec<String>,
    /// Sprite file path inside the output tree.
    pub dest: PathBuf,
    pub id_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// `0` picks an ephemeral port.
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Coalescing window for change bursts.
    pub debounce_ms: u64,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for Config {
    fn default() -> Self {
        Self {
            source: PathBuf::from("src"),
            output: PathBuf::from("dist"),
            targets: vec![
                "last 3 versions".to_string(),
                "Firefox > 30".to_string(),
                "Chrome > 30".to_string(),
                "Opera > 30".to_string(),
            ],
            markup: MarkupConfig::default(),
            styles: StylesConfig::default(),
            scripts: ScriptsConfig::default(),
            static_files: StaticConfig::default(),
            vendor: Vec::new(),
            sprite: SpriteConfig::default(),
            server: ServerConfig::default(),
            watch: WatchConfig::default(),
            tasks: BTreeMap::new(),
        }
    }
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            patterns: vec!["*.html".to_string()],
            dest: PathBuf::from("."),
            minify: true,
            vars: BTreeMap::new(),
        }
    }
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("scss"),
            entries: vec![PathBuf::from("style.scss")],
            watch: vec!["**/*.scss".to_string(), "**/*.css".to_string()],
            dest: PathBuf::from("styles"),
            minify: true,
        }
    }
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("js"),
            files: vec!["**/*.js".to_string()],
            bundle: "main.js".to_string(),
            dest: PathBuf::from("scripts"),
            minify: true,
        }
    }
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("static"),
            patterns: vec!["**/*".to_string()],
            dest: PathBuf::from("."),
        }
    }
}

impl Default for SpriteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: PathBuf::from("icons"),
            patterns: vec!["*.svg".to_string()],
            dest: PathBuf::from("images/sprite.svg"),
            id_prefix: "icon-".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 200 }
    }
}

// ---------------------------------------------------------------------------
// Derived output paths (used by markup templates)
// ---------------------------------------------------------------------------

impl Config {
    /// Output-relative URL of each compiled stylesheet, in entry order.
    pub fn style_urls(&self) -> Vec<String> {
        self.styles
            .entries
            .iter()
            .map(|entry| url_path(&self.styles.dest.join(entry.with_extension("css"))))
            .collect()
    }

    /// Output-relative URL of the script bundle.
    pub fn script_url(&self) -> String {
        url_path(&self.scripts.dest.join(&self.scripts.bundle))
    }

    /// Output-relative URL of the sprite, when enabled.
    pub fn sprite_url(&self) -> Option<String> {
        self.sprite.enabled.then(|| url_path(&self.sprite.dest))
    }

    /// Reject layouts that would make `clean` destroy sources.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_plain_relative(&self.output) {
            return Err(ConfigError::Invalid(format!(
                "output '{}' must be a relative directory below the project root",
                self.output.display()
            )));
        }
        let output = normal_components(&self.output);
        let source = match relative_components(&self.source) {
            Some(parts) => parts,
            None => {
                return Err(ConfigError::Invalid(format!(
                    "source '{}' must be a relative directory below the project root",
                    self.source.display()
                )))
            }
        };
        // An empty source is the project root and contains everything.
        if source.is_empty() || source.starts_with(&output) || output.starts_with(&source) {
            return Err(ConfigError::Invalid(format!(
                "source '{}' and output '{}' must not contain each other",
                self.source.display(),
                self.output.display()
            )));
        }
        if self.scripts.bundle.trim().is_empty() {
            return Err(ConfigError::Invalid("scripts.bundle must not be empty".into()));
        }
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::Invalid("watch.debounce_ms must be > 0".into()));
        }
        Ok(())
    }
}

fn is_plain_relative(path: &Path) -> bool {
    let mut normals = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => normals += 1,
            Component::CurDir => {}
            _ => return false,
        }
    }
    normals > 0
}

fn normal_components(path: &Path) -> Vec<&std::ffi::OsStr> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// `Normal` components of a relative path, `None` if it is absolute or uses `..`.
fn relative_components(path: &Path) -> Option<Vec<&std::ffi::OsStr>> {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then(|| normal_components(path))
}

/// Forward-slash path with any leading `./` removed.
pub fn url_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// Project: config + where it lives
// ---------------------------------------------------------------------------

/// A loaded project: its root directory and parsed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join(&self.config.source)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.config.output)
    }

    /// `<root>/.cadence/` — hash stores and other build state.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }
}

/// `<root>/cadence.yaml` — pure, no I/O.
pub fn config_path_at(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Load `<root>/cadence.yaml`, falling back to defaults when absent.
///
/// Returns `ConfigError::Parse` (with path + line context) if malformed.
pub fn load_at(root: &Path) -> Result<Project, ConfigError> {
    let path = config_path_at(root);
    let config = if path.exists() {
        let contents = std::fs::read_to_string(&path).map_err(|e| config_io_err(&path, e))?;
        if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                source: e,
            })?
        }
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };
    config.validate()?;
    Ok(Project::new(root, config))
}

/// Write `config` to `<root>/cadence.yaml` via `.tmp` + rename.
pub fn save_at(root: &Path, config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path_at(root);
    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_file_name(format!("{CONFIG_FILE}.tmp"));
    std::fs::write(&tmp, yaml).map_err(|e| config_io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(config_io_err(&path, e));
    }
    Ok(path)
}
