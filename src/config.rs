//! Run configuration
//!
//! A run is described by a [`BackupConfig`]: the destination root, the
//! ordered list of targets, and a handful of options. It is loaded from a
//! TOML file and then passed explicitly to everything that needs it.
//!
//! ```toml
//! backup_dest = "/mnt/backup"
//! paths = ["/home/me/notes", "/etc/hosts"]
//!
//! naming = "file-name"     # or "stem"
//! on_error = "continue"    # or "abort"
//! shallow = true
//! follow_symlinks = false
//! ignore = ["*.swp", ".cache"]
//! ```
//!
//! Relative paths are resolved against the current working directory.

use crate::error::{MirrorError, Result};
use crate::filter::IgnoreFilter;
use crate::types::{BackupTarget, DestinationNaming, ErrorPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Shape of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    backup_dest: Option<String>,
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    naming: DestinationNaming,
    #[serde(default)]
    on_error: ErrorPolicy,
    #[serde(default = "default_shallow")]
    shallow: bool,
    #[serde(default)]
    follow_symlinks: bool,
    #[serde(default)]
    ignore: Vec<String>,
}

fn default_shallow() -> bool {
    true
}

/// Validated configuration for one backup run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Absolute path of the destination root
    pub backup_dest: PathBuf,
    /// Targets in configured order, duplicates kept
    pub targets: Vec<BackupTarget>,
    /// How target backups are named under the destination root
    pub naming: DestinationNaming,
    /// What to do when a target fails
    pub on_error: ErrorPolicy,
    /// Trust matching size and mtime without reading file contents
    pub shallow: bool,
    /// Copy symlink targets instead of the links
    pub follow_symlinks: bool,
    /// Glob patterns for entry names to skip
    pub ignore: Vec<String>,
}

impl BackupConfig {
    /// Create a configuration with default options
    pub fn new(backup_dest: PathBuf, targets: Vec<BackupTarget>) -> Self {
        Self {
            backup_dest,
            targets,
            naming: DestinationNaming::default(),
            on_error: ErrorPolicy::default(),
            shallow: true,
            follow_symlinks: false,
            ignore: Vec::new(),
        }
    }

    /// Load and validate a configuration file
    ///
    /// # Errors
    ///
    /// - [`MirrorError::Config`] if the file cannot be read or a required
    ///   value is missing or empty
    /// - [`MirrorError::Toml`] if the file is not valid TOML
    /// - [`MirrorError::InvalidPattern`] if an ignore pattern is malformed
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Parse config: {:?}", path);
        let text = fs::read_to_string(path)
            .map_err(|e| MirrorError::config(format!("cannot read {:?}: {}", path, e)))?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text)?;

        let dest = raw
            .backup_dest
            .ok_or_else(|| MirrorError::config("backup_dest is missing"))?;
        let backup_dest = resolve(&dest, "backup_dest")?;
        debug!("Parsed backup destination: {:?}", backup_dest);

        if raw.paths.is_empty() {
            return Err(MirrorError::config("paths is empty; nothing to back up"));
        }
        let targets = raw
            .paths
            .iter()
            .map(|p| {
                let path = resolve(p, "paths")?;
                debug!("Parsed path to backup: {:?}", path);
                Ok(BackupTarget::new(path))
            })
            .collect::<Result<Vec<_>>>()?;

        // Compile once here so bad patterns fail before any copying
        IgnoreFilter::new(&raw.ignore)?;

        Ok(Self {
            backup_dest,
            targets,
            naming: raw.naming,
            on_error: raw.on_error,
            shallow: raw.shallow,
            follow_symlinks: raw.follow_symlinks,
            ignore: raw.ignore,
        })
    }

    /// Replace the destination root
    pub fn with_backup_dest(mut self, backup_dest: &Path) -> Result<Self> {
        self.backup_dest = resolve_path(backup_dest, "backup_dest")?;
        Ok(self)
    }

    /// Compile the ignore patterns
    pub fn ignore_filter(&self) -> Result<IgnoreFilter> {
        IgnoreFilter::new(&self.ignore)
    }
}

/// Turn a configured path string into an absolute path
fn resolve(value: &str, key: &str) -> Result<PathBuf> {
    resolve_path(Path::new(value.trim()), key)
}

fn resolve_path(path: &Path, key: &str) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(MirrorError::config(format!("{} contains an empty path", key)));
    }
    std::path::absolute(path)
        .map_err(|e| MirrorError::config(format!("cannot resolve {:?} in {}: {}", path, key, e)))
}
