//! Copy execution
//!
//! The planner never touches the destination directly; it tells a
//! [`CopyExecutor`] what to copy. [`FsCopier`] performs real copies and
//! [`DryRunCopier`] only records and logs them.
//!
//! Copies are additive: nothing at the destination is ever removed, and each
//! completed copy is durable on its own, so an interrupted run can simply be
//! repeated.

use crate::error::{MirrorError, Result};
use crate::filter::IgnoreFilter;
use crate::types::CopyPair;
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};
use walkdir::WalkDir;

/// Performs the copy operations decided by the planner
pub trait CopyExecutor {
    /// Copy a single file, overwriting `dst`; returns bytes written
    ///
    /// A symlink at `dst` is replaced, never written through.
    fn copy_file(&mut self, src: &Path, dst: &Path) -> Result<u64>;

    /// Copy the directory tree at `src` to `dst`, which must not exist yet;
    /// returns bytes written
    fn copy_tree(&mut self, src: &Path, dst: &Path) -> Result<u64>;

    /// Create `path` and any missing parents
    fn make_dirs(&mut self, path: &Path) -> Result<()>;

    /// Whether copies are only simulated
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// [`CopyExecutor`] writing to the real filesystem
#[derive(Debug, Clone, Default)]
pub struct FsCopier {
    follow_symlinks: bool,
    filter: IgnoreFilter,
}

impl FsCopier {
    /// Copier that recreates symlinks as links and ignores nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy what symlinks point to instead of the links themselves
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Skip entries matched by `filter` inside copied trees
    pub fn with_filter(mut self, filter: IgnoreFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl CopyExecutor for FsCopier {
    fn copy_file(&mut self, src: &Path, dst: &Path) -> Result<u64> {
        trace!("copy_file {:?} -> {:?}", src, dst);
        replace_file(src, dst, self.follow_symlinks).map_err(|e| MirrorError::copy(src, dst, e))
    }

    fn copy_tree(&mut self, src: &Path, dst: &Path) -> Result<u64> {
        trace!("copy_tree {:?} -> {:?}", src, dst);
        if fs::symlink_metadata(dst).is_ok() {
            return Err(MirrorError::copy(
                src,
                dst,
                io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists"),
            ));
        }

        let mut bytes = 0u64;
        let walker = WalkDir::new(src)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.filter.is_ignored(e.file_name()));

        for entry in walker {
            let entry = entry.map_err(|e| MirrorError::copy(src, dst, io::Error::from(e)))?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .map_err(|_| MirrorError::internal(format!("{:?} is outside {:?}", entry.path(), src)))?;
            let target = dst.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                fs::create_dir_all(&target).map_err(|e| MirrorError::copy(entry.path(), &target, e))?;
            } else if file_type.is_symlink() {
                let link = fs::read_link(entry.path())
                    .map_err(|e| MirrorError::copy(entry.path(), &target, e))?;
                create_symlink(&link, &target).map_err(|e| MirrorError::copy(entry.path(), &target, e))?;
            } else {
                bytes += copy_with_mtime(entry.path(), &target)
                    .map_err(|e| MirrorError::copy(entry.path(), &target, e))?;
            }
        }

        Ok(bytes)
    }

    fn make_dirs(&mut self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }
}

/// Put a copy of `src` at `dst`, replacing a link or stale entry there
///
/// When links are kept, a source symlink is recreated as a link.
fn replace_file(src: &Path, dst: &Path, follow_symlinks: bool) -> io::Result<u64> {
    let src_is_link = !follow_symlinks && fs::symlink_metadata(src)?.file_type().is_symlink();

    if let Ok(existing) = fs::symlink_metadata(dst) {
        if existing.file_type().is_symlink() || (src_is_link && !existing.is_dir()) {
            trace!("Removing {:?} before copy", dst);
            remove_link(dst)?;
        }
    }

    if src_is_link {
        create_symlink(&fs::read_link(src)?, dst)?;
        return Ok(0);
    }
    copy_with_mtime(src, dst)
}

#[cfg(unix)]
fn remove_link(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

/// Directory symlinks on Windows are removed as directories
#[cfg(windows)]
fn remove_link(path: &Path) -> io::Result<()> {
    fs::remove_file(path).or_else(|_| fs::remove_dir(path))
}

/// Copy content and permissions, then carry over the modification time
///
/// Keeping the mtime lets the shallow comparison recognise the copy as
/// identical on the next run.
fn copy_with_mtime(src: &Path, dst: &Path) -> io::Result<u64> {
    let bytes = fs::copy(src, dst)?;
    let metadata = fs::metadata(src)?;
    filetime::set_file_mtime(dst, FileTime::from_last_modification_time(&metadata))?;
    Ok(bytes)
}

/// Create a symlink (cross-platform)
#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Create a symlink (Windows)
#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
    if resolved.is_dir() {
        symlink_dir(target, link)
    } else {
        symlink_file(target, link)
    }
}

/// A copy that a [`DryRunCopier`] was asked to perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlannedCopy {
    /// Single file copy
    File(CopyPair),
    /// Whole tree copy
    Tree(CopyPair),
    /// Directory creation
    MakeDirs {
        /// Directory to create
        path: PathBuf,
    },
}

/// [`CopyExecutor`] that records operations without touching the disk
///
/// Reported byte counts are the sizes the copies would write.
#[derive(Debug, Clone, Default)]
pub struct DryRunCopier {
    planned: Vec<PlannedCopy>,
    filter: IgnoreFilter,
}

impl DryRunCopier {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave entries matched by `filter` out of tree sizes, as [`FsCopier`] does
    pub fn with_filter(mut self, filter: IgnoreFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Operations recorded so far, in call order
    pub fn planned(&self) -> &[PlannedCopy] {
        &self.planned
    }
}

impl CopyExecutor for DryRunCopier {
    fn copy_file(&mut self, src: &Path, dst: &Path) -> Result<u64> {
        info!("[dry-run] copy file {:?} -> {:?}", src, dst);
        let size = fs::metadata(src).map(|m| m.len()).unwrap_or(0);
        self.planned.push(PlannedCopy::File(CopyPair::new(src, dst)));
        Ok(size)
    }

    fn copy_tree(&mut self, src: &Path, dst: &Path) -> Result<u64> {
        info!("[dry-run] copy tree {:?} -> {:?}", src, dst);
        let size = WalkDir::new(src)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.filter.is_ignored(e.file_name()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum();
        self.planned.push(PlannedCopy::Tree(CopyPair::new(src, dst)));
        Ok(size)
    }

    fn make_dirs(&mut self, path: &Path) -> Result<()> {
        debug!("[dry-run] create directory {:?}", path);
        self.planned.push(PlannedCopy::MakeDirs {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
