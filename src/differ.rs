//! Source/destination tree comparison
//!
//! [`TreeDiffer`] walks a source directory and its backup side by side and
//! works out the smallest set of copies that brings the backup up to date:
//!
//! - files that are new or whose contents differ are copied one by one
//! - directories that do not exist in the backup at all are copied as whole
//!   subtrees, without looking inside them
//! - directories present on both sides are descended into
//! - entries that only exist in the backup are left alone
//!
//! The walk is depth-first and driven by an explicit stack of directory
//! pairs, so deep trees cannot exhaust the call stack. Subdirectories are
//! discovered as the walk goes; nothing is enumerated up front. Entry order
//! comes from the oracle (lexical), which makes results deterministic.
//!
//! ```rust,no_run
//! use mirrorup::differ::TreeDiffer;
//! use mirrorup::oracle::FsOracle;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let oracle = FsOracle::new();
//! let result = TreeDiffer::new(&oracle).diff(Path::new("/home/me/docs"), Path::new("/backup/docs"))?;
//! for pair in &result.files {
//!     println!("{:?} -> {:?}", pair.src, pair.dst);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::oracle::ComparisonOracle;
use crate::types::{CopyPair, DiffResult};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Computes [`DiffResult`]s using a [`ComparisonOracle`]
#[derive(Debug)]
pub struct TreeDiffer<'a, O: ComparisonOracle + ?Sized> {
    oracle: &'a O,
}

impl<'a, O: ComparisonOracle + ?Sized> TreeDiffer<'a, O> {
    /// Create a differ backed by `oracle`
    pub fn new(oracle: &'a O) -> Self {
        Self { oracle }
    }

    /// Compare `source` against its backup `dest`
    ///
    /// Both directories must exist. Returns a fresh [`DiffResult`] whose file
    /// list holds every new or modified file under `source`, and whose
    /// directory list holds every directory absent from `dest`. Files listed
    /// in `dirs` subtrees never appear in `files`.
    ///
    /// # Errors
    ///
    /// - [`MirrorError::Traversal`](crate::MirrorError::Traversal) naming the
    ///   first directory that could not be listed. No partial result is
    ///   returned.
    pub fn diff(&self, source: &Path, dest: &Path) -> Result<DiffResult> {
        let mut result = DiffResult::default();
        let mut stack: Vec<(PathBuf, PathBuf)> = vec![(source.to_path_buf(), dest.to_path_buf())];

        while let Some((left, right)) = stack.pop() {
            let level = self.diff_level(&left, &right)?;
            let subdirs = level.subdirs;
            result.merge(level.result);

            // Reversed so the lexically first subdirectory is popped next
            stack.extend(subdirs.into_iter().rev());
        }

        debug!(
            "Diff {:?} -> {:?}: {} files, {} dirs, {} conflicts",
            source,
            dest,
            result.files.len(),
            result.dirs.len(),
            result.conflicts.len()
        );
        Ok(result)
    }

    /// Diff a single directory pair without descending
    fn diff_level(&self, left: &Path, right: &Path) -> Result<Level> {
        trace!("Comparing {:?} with {:?}", left, right);
        let cmp = self.oracle.list_diff(left, right)?;
        let mut level = Level::default();
        let mut new_files = Vec::new();

        for name in &cmp.left_only {
            let pair = CopyPair::child(left, right, name);
            if self.oracle.is_link(&pair.src) {
                new_files.push(pair);
            } else if self.oracle.is_dir(&pair.src) {
                level.result.dirs.push(pair);
            } else if self.oracle.is_file(&pair.src) {
                new_files.push(pair);
            } else {
                debug!("Skipping {:?}: neither file nor directory", pair.src);
            }
        }

        level.result.files = cmp
            .differing
            .iter()
            .map(|name| CopyPair::child(left, right, name))
            .collect();
        level.result.files.extend(new_files);

        for name in &cmp.type_conflicts {
            let pair = CopyPair::child(left, right, name);
            warn!("Type mismatch between {:?} and {:?}, not copied", pair.src, pair.dst);
            level.result.conflicts.push(pair);
        }

        level.subdirs = cmp
            .common_subdirs
            .iter()
            .map(|name| (left.join(name), right.join(name)))
            .collect();

        Ok(level)
    }
}

/// Output of one directory pair: its copies plus the subdirectories to visit
#[derive(Debug, Default)]
struct Level {
    result: DiffResult,
    subdirs: Vec<(PathBuf, PathBuf)>,
}
