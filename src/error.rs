//! Error types for mirrorup
//!
//! Every fallible operation in the crate returns [`Result<T>`], whose error
//! side is [`MirrorError`]. Errors carry the path they concern whenever one
//! is known, so a per-target report can say exactly what went wrong.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Type alias for Results in the mirrorup library
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Main error type for all mirrorup operations
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Configuration is missing a value or contains a malformed one
    #[error("Configuration error: {0}")]
    Config(String),

    /// A directory could not be listed while diffing
    #[error("Cannot read directory {path:?}: {source}")]
    Traversal {
        /// Directory that could not be read
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Copying a file or tree failed
    #[error("Copy {src:?} -> {dst:?} failed: {source}")]
    Copy {
        /// Source path of the failed copy
        src: PathBuf,
        /// Destination path of the failed copy
        dst: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// I/O errors outside of traversal and copying
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML or has the wrong shape
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// Pattern parsing error
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MirrorError {
    /// Create a configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        MirrorError::Config(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        MirrorError::Internal(msg.into())
    }

    /// Wrap an I/O error raised while listing `path`
    pub fn traversal(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MirrorError::Traversal {
            path: path.into(),
            source,
        }
    }

    /// Wrap an I/O error raised while copying `src` to `dst`
    pub fn copy(src: impl Into<PathBuf>, dst: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MirrorError::Copy {
            src: src.into(),
            dst: dst.into(),
            source,
        }
    }

    /// Check if this error must stop the whole run before any copying
    ///
    /// Fatal errors come from configuration. Traversal and copy errors only
    /// concern a single target.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MirrorError::Config(_) | MirrorError::Toml(_) | MirrorError::InvalidPattern(_)
        )
    }

    /// The path this error is about, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            MirrorError::Traversal { path, .. } => Some(path),
            MirrorError::Copy { src, .. } => Some(src),
            MirrorError::WalkDir(err) => err.path(),
            _ => None,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            MirrorError::Traversal { path, source }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                format!(
                    "Permission denied while reading {:?}. Check directory permissions or exclude it with an ignore pattern.",
                    path
                )
            }
            MirrorError::Copy { dst, source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                format!("Permission denied writing {:?}. Check the backup destination permissions.", dst)
            }
            MirrorError::Toml(err) => {
                format!("Config file could not be parsed: {}", err.message())
            }
            _ => self.to_string(),
        }
    }
}
