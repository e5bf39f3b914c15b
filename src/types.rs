//! Core data types used throughout mirrorup
//!
//! ## Overview
//!
//! - **Inputs**: [`BackupTarget`], [`TargetKind`], [`DestinationNaming`], [`ErrorPolicy`]
//! - **Diffing**: [`CopyPair`], [`DirComparison`], [`DiffResult`]
//! - **Reporting**: [`TargetOutcome`], [`TargetReport`], [`RunReport`]
//!
//! ## Examples
//!
//! ```rust
//! use mirrorup::types::{DestinationNaming, BackupTarget};
//! use std::path::PathBuf;
//!
//! let target = BackupTarget::new(PathBuf::from("/home/me/notes.txt"));
//! let name = DestinationNaming::FileName.backup_name(&target.path).unwrap();
//! assert_eq!(name, "notes.txt");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// One configured source path to mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupTarget {
    /// Absolute path of the file or directory
    pub path: PathBuf,
}

impl BackupTarget {
    /// Create a target for `path`
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl From<PathBuf> for BackupTarget {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

/// On-disk type of a target, determined when the target is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Regular file (or symlink to one)
    File,
    /// Directory (or symlink to one)
    Directory,
    /// Neither; missing path or broken symlink
    Missing,
}

/// How a target's subtree is named under the destination root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestinationNaming {
    /// Full base name; `notes.txt` is stored as `notes.txt`
    #[default]
    FileName,
    /// Base name without its final extension; `notes.txt` is stored as `notes`
    ///
    /// Two targets that differ only by extension map to the same backup.
    /// Kept for destination trees created with this layout.
    Stem,
}

impl DestinationNaming {
    /// Name under which `path` is stored in the destination root
    ///
    /// Returns `None` for paths without a final component, such as `/` or `..`.
    pub fn backup_name<'a>(&self, path: &'a Path) -> Option<&'a OsStr> {
        match self {
            DestinationNaming::FileName => path.file_name(),
            DestinationNaming::Stem => path.file_stem(),
        }
    }
}

/// What to do when a target fails mid-run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Record the failure and move on to the next target
    #[default]
    Continue,
    /// Stop the run and return the error
    Abort,
}

/// A `(source, destination)` pair handed to the copy executor
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CopyPair {
    /// Path to copy from
    pub src: PathBuf,
    /// Path to copy to
    pub dst: PathBuf,
}

impl CopyPair {
    /// Build a pair from anything path-like
    pub fn new(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }

    /// Pair for entry `name` inside the directory pair `(left, right)`
    pub fn child(left: &Path, right: &Path, name: &OsStr) -> Self {
        Self {
            src: left.join(name),
            dst: right.join(name),
        }
    }
}

/// Comparison of two directories, one level deep
///
/// Every set holds entry names, ordered lexically so that traversal is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirComparison {
    /// Entries present only in the left directory
    pub left_only: BTreeSet<OsString>,
    /// Entries present only in the right directory
    pub right_only: BTreeSet<OsString>,
    /// Files present on both sides whose contents differ
    pub differing: BTreeSet<OsString>,
    /// Directories present on both sides
    pub common_subdirs: BTreeSet<OsString>,
    /// Names that are a file on one side and a directory on the other,
    /// or that could not be inspected
    pub type_conflicts: BTreeSet<OsString>,
}

/// Copy operations needed to bring a destination directory up to date
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Files to copy one by one, new or modified
    pub files: Vec<CopyPair>,
    /// Directories missing on the destination, copied as whole subtrees
    pub dirs: Vec<CopyPair>,
    /// Entries skipped because their type differs between the two sides
    pub conflicts: Vec<CopyPair>,
}

impl DiffResult {
    /// Check if nothing needs to be copied
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// Number of copy operations this result describes
    pub fn operation_count(&self) -> usize {
        self.files.len() + self.dirs.len()
    }

    /// Append another result's operations to this one
    pub fn merge(&mut self, other: DiffResult) {
        self.files.extend(other.files);
        self.dirs.extend(other.dirs);
        self.conflicts.extend(other.conflicts);
    }
}

/// Outcome of processing a single target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetOutcome {
    /// Something was copied
    Copied {
        /// Individual file copies
        files: usize,
        /// Whole-tree copies
        trees: usize,
        /// Bytes written
        bytes: u64,
    },
    /// The backup was already up to date
    Unchanged,
    /// The target was not processed
    Skipped {
        /// Why it was skipped
        reason: String,
    },
    /// Processing the target failed
    Failed {
        /// Error description
        error: String,
    },
}

impl TargetOutcome {
    /// Check if this outcome is a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, TargetOutcome::Failed { .. })
    }
}

/// Per-target line of a [`RunReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    /// Configured source path
    pub target: PathBuf,
    /// Where its backup lives, when a name could be derived
    pub destination: Option<PathBuf>,
    /// Type observed when the target was processed
    pub kind: TargetKind,
    /// What happened
    pub outcome: TargetOutcome,
}

/// Result of one backup run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Destination root the run wrote to
    pub destination_root: PathBuf,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
    /// Whether copies were only simulated
    pub dry_run: bool,
    /// One entry per processed target, in configured order
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    /// Check if any target failed
    pub fn has_failures(&self) -> bool {
        self.targets.iter().any(|t| t.outcome.is_failure())
    }

    /// Number of targets that failed
    pub fn failed_count(&self) -> usize {
        self.targets.iter().filter(|t| t.outcome.is_failure()).count()
    }

    /// Total individual file copies
    pub fn files_copied(&self) -> usize {
        self.copied().map(|(files, _, _)| files).sum()
    }

    /// Total whole-tree copies
    pub fn trees_copied(&self) -> usize {
        self.copied().map(|(_, trees, _)| trees).sum()
    }

    /// Total bytes written
    pub fn bytes_copied(&self) -> u64 {
        self.copied().map(|(_, _, bytes)| bytes).sum()
    }

    fn copied(&self) -> impl Iterator<Item = (usize, usize, u64)> + '_ {
        self.targets.iter().filter_map(|t| match t.outcome {
            TargetOutcome::Copied { files, trees, bytes } => Some((files, trees, bytes)),
            _ => None,
        })
    }
}
