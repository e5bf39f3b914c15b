//! Content and structure comparison
//!
//! The [`ComparisonOracle`] trait is the only way the differ and planner look
//! at the filesystem. [`FsOracle`] implements it against the real disk.
//!
//! ## File equality
//!
//! With `shallow` enabled (the default) two regular files whose size and
//! modification time agree are treated as identical without reading them.
//! Otherwise a size mismatch means different, and equal sizes fall back to a
//! chunked byte comparison. Nothing is hashed.
//!
//! ## Directory comparison
//!
//! [`ComparisonOracle::list_diff`] looks one level deep. Entries common to
//! both sides are split into differing files, common subdirectories and type
//! conflicts. Whether an entry is a file or a directory is decided after
//! following symlinks.
//!
//! ## Symlinks
//!
//! Unless `follow_symlinks` is set, a source symlink is compared as a link:
//! two links are identical when they point at the same target, and a link is
//! never identical to a regular file. A symlink on the backup side is never
//! followed, so a stale link can be replaced but is never written through.

use crate::error::{MirrorError, Result};
use crate::filter::IgnoreFilter;
use crate::types::DirComparison;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, trace};

const CHUNK_SIZE: usize = 8192;

/// Comparison capability the differ and planner depend on
pub trait ComparisonOracle {
    /// Check whether `path` exists
    fn exists(&self, path: &Path) -> bool;

    /// Check whether `path` is a regular file
    fn is_file(&self, path: &Path) -> bool;

    /// Check whether `path` is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Check whether `path` is a symlink that is backed up as a link
    fn is_link(&self, _path: &Path) -> bool {
        false
    }

    /// Check whether two files have identical contents
    fn files_identical(&self, a: &Path, b: &Path) -> Result<bool>;

    /// Compare the entries of two directories
    ///
    /// # Errors
    ///
    /// - [`MirrorError::Traversal`] if either directory cannot be listed
    fn list_diff(&self, dir_a: &Path, dir_b: &Path) -> Result<DirComparison>;
}

/// Filesystem-backed [`ComparisonOracle`]
#[derive(Debug, Clone)]
pub struct FsOracle {
    shallow: bool,
    follow_symlinks: bool,
    filter: IgnoreFilter,
}

impl FsOracle {
    /// Oracle with shallow comparison and no ignore patterns
    pub fn new() -> Self {
        Self {
            shallow: true,
            follow_symlinks: false,
            filter: IgnoreFilter::empty(),
        }
    }

    /// Enable or disable the size/mtime shortcut
    pub fn with_shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    /// Compare what source symlinks point to instead of the links
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Skip entries matched by `filter` when listing directories
    pub fn with_filter(mut self, filter: IgnoreFilter) -> Self {
        self.filter = filter;
        self
    }

    fn read_names(&self, dir: &Path) -> Result<BTreeSet<OsString>> {
        let entries = fs::read_dir(dir).map_err(|e| MirrorError::traversal(dir, e))?;
        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| MirrorError::traversal(dir, e))?;
            let name = entry.file_name();
            if self.filter.is_ignored(&name) {
                trace!("Ignoring {:?} in {:?}", name, dir);
                continue;
            }
            names.insert(name);
        }
        Ok(names)
    }

    /// Whether link handling applies to the pair `a` (source) and `b` (backup)
    fn involves_link(&self, a: &Path, b: &Path) -> bool {
        self.is_link(a) || is_symlink(b)
    }

    /// Link-aware equality; only called when [`involves_link`](Self::involves_link) holds
    fn links_identical(&self, a: &Path, b: &Path) -> Result<bool> {
        if !self.is_link(a) || !is_symlink(b) {
            return Ok(false);
        }
        Ok(fs::read_link(a)? == fs::read_link(b)?)
    }
}

/// Check `path` itself, without following it, for being a symlink
fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

impl Default for FsOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ComparisonOracle for FsOracle {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_link(&self, path: &Path) -> bool {
        !self.follow_symlinks && is_symlink(path)
    }

    fn files_identical(&self, a: &Path, b: &Path) -> Result<bool> {
        if self.involves_link(a, b) {
            return self.links_identical(a, b);
        }

        let meta_a = fs::metadata(a)?;
        let meta_b = fs::metadata(b)?;

        if !meta_a.is_file() || !meta_b.is_file() {
            return Ok(false);
        }
        if meta_a.len() != meta_b.len() {
            return Ok(false);
        }
        if self.shallow {
            if let (Ok(ma), Ok(mb)) = (meta_a.modified(), meta_b.modified()) {
                if ma == mb {
                    return Ok(true);
                }
            }
        }

        contents_equal(a, b)
    }

    fn list_diff(&self, dir_a: &Path, dir_b: &Path) -> Result<DirComparison> {
        let left = self.read_names(dir_a)?;
        let right = self.read_names(dir_b)?;

        let mut cmp = DirComparison {
            left_only: left.difference(&right).cloned().collect(),
            right_only: right.difference(&left).cloned().collect(),
            ..Default::default()
        };

        for name in left.intersection(&right) {
            let path_a = dir_a.join(name);
            let path_b = dir_b.join(name);

            if self.involves_link(&path_a, &path_b) {
                // Links are replaced like files; only a real directory on
                // the other side is a conflict
                let dir_side = if is_symlink(&path_b) {
                    path_a.is_dir() && !self.is_link(&path_a)
                } else {
                    fs::symlink_metadata(&path_b).map(|m| m.is_dir()).unwrap_or(false)
                };
                if dir_side {
                    cmp.type_conflicts.insert(name.clone());
                } else if !self.links_identical(&path_a, &path_b)? {
                    cmp.differing.insert(name.clone());
                }
                continue;
            }

            let (meta_a, meta_b) = match (fs::metadata(&path_a), fs::metadata(&path_b)) {
                (Ok(a), Ok(b)) => (a, b),
                _ => {
                    debug!("Cannot inspect {:?} on both sides", name);
                    cmp.type_conflicts.insert(name.clone());
                    continue;
                }
            };

            if meta_a.is_dir() && meta_b.is_dir() {
                cmp.common_subdirs.insert(name.clone());
            } else if meta_a.is_file() && meta_b.is_file() {
                if !self.files_identical(&path_a, &path_b)? {
                    cmp.differing.insert(name.clone());
                }
            } else {
                cmp.type_conflicts.insert(name.clone());
            }
        }

        Ok(cmp)
    }
}

/// Compare two files byte by byte
fn contents_equal(a: &Path, b: &Path) -> Result<bool> {
    let mut reader_a = BufReader::new(File::open(a)?);
    let mut reader_b = BufReader::new(File::open(b)?);
    let mut buf_a = vec![0u8; CHUNK_SIZE];
    let mut buf_b = vec![0u8; CHUNK_SIZE];

    loop {
        let n = read_full(&mut reader_a, &mut buf_a)?;
        let m = read_full(&mut reader_b, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows, returning the number of bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
