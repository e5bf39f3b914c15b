//! # mirrorup - incremental one-way backups
//!
//! Mirrors a configured list of files and directories into a single backup
//! tree, copying only what changed since the previous run.
//!
//! ## Overview
//!
//! Every target gets one entry under the destination root, named after the
//! target's base name:
//! - a file target is compared with its backup and copied if it differs
//! - a directory target is copied whole on the first run; afterwards it is
//!   diffed against its backup and only new or modified files, plus wholly
//!   new subdirectories, are copied
//! - nothing is ever deleted from the destination, so files removed from the
//!   source stay in the backup
//!
//! Re-running with no source changes copies nothing, and an interrupted run
//! converges when repeated.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mirrorup::{BackupConfig, BackupPlanner};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BackupConfig::load(Path::new("backup.toml"))?;
//! let mut planner = BackupPlanner::from_config(&config)?;
//! let report = planner.run(&config.backup_dest, &config.targets)?;
//! println!("Copied {} files and {} trees", report.files_copied(), report.trees_copied());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`oracle`]: the [`ComparisonOracle`] trait and its filesystem
//!   implementation, answering "are these files equal" and "how do these
//!   directories differ"
//! - [`differ`]: [`TreeDiffer`], the depth-first walk that turns directory
//!   comparisons into a [`DiffResult`]
//! - [`executor`]: the [`CopyExecutor`] trait, real copies and dry runs
//! - [`planner`]: [`BackupPlanner`], one pass over all targets
//! - [`config`]: TOML configuration loading
//!
//! The oracle and executor are traits so the planner can be exercised
//! without touching the disk.
//!
//! ## Error Handling
//!
//! All operations return `Result<T, MirrorError>`. Configuration errors are
//! fatal; traversal and copy errors are attributed to a single target and,
//! by default, the run continues with the next one.

pub mod config;
pub mod differ;
pub mod error;
pub mod executor;
pub mod filter;
pub mod logging;
pub mod oracle;
pub mod planner;
pub mod types;

pub use config::BackupConfig;
pub use differ::TreeDiffer;
pub use error::{MirrorError, Result};
pub use executor::{CopyExecutor, DryRunCopier, FsCopier, PlannedCopy};
pub use filter::IgnoreFilter;
pub use oracle::{ComparisonOracle, FsOracle};
pub use planner::BackupPlanner;
pub use types::*;
