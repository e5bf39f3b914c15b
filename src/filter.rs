//! Name-based ignore patterns
//!
//! Patterns are glob expressions matched against a single entry name, not a
//! full path, so `*.swp` and `.cache` apply at every depth. The same filter is
//! shared by the oracle and the copy executor: an ignored entry is neither
//! compared nor copied.

use crate::error::{MirrorError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::ffi::OsStr;

/// Compiled set of ignore patterns
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    set: GlobSet,
    patterns: Vec<String>,
}

impl IgnoreFilter {
    /// Compile `patterns` into a filter
    ///
    /// # Errors
    ///
    /// - [`MirrorError::InvalidPattern`] if any pattern is not a valid glob
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| MirrorError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| MirrorError::InvalidPattern(e.to_string()))?;

        Ok(Self {
            set,
            patterns: patterns.to_vec(),
        })
    }

    /// Filter that ignores nothing
    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Check whether an entry named `name` should be skipped
    pub fn is_ignored(&self, name: &OsStr) -> bool {
        !self.patterns.is_empty() && self.set.is_match(name)
    }

    /// Patterns this filter was built from
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        Self::empty()
    }
}
