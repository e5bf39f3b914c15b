//! Backup run orchestration
//!
//! [`BackupPlanner`] processes the configured targets in order. A file
//! target is compared with its backup and copied if it changed. A directory
//! target is copied whole the first time, and diffed with [`TreeDiffer`] on
//! later runs. Missing targets are skipped with a warning.
//!
//! Each target is independent: a failure is recorded in the [`RunReport`]
//! and, under [`ErrorPolicy::Continue`], the run moves on. Work already done
//! for earlier targets is never undone.

use crate::config::BackupConfig;
use crate::differ::TreeDiffer;
use crate::error::{MirrorError, Result};
use crate::executor::{CopyExecutor, DryRunCopier, FsCopier};
use crate::oracle::{ComparisonOracle, FsOracle};
use crate::types::{
    BackupTarget, DestinationNaming, ErrorPolicy, RunReport, TargetKind, TargetOutcome, TargetReport,
};
use chrono::Utc;
use std::io;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Drives a backup run over a list of targets
#[derive(Debug)]
pub struct BackupPlanner<O: ComparisonOracle, E: CopyExecutor> {
    oracle: O,
    executor: E,
    naming: DestinationNaming,
    on_error: ErrorPolicy,
}

impl BackupPlanner<FsOracle, FsCopier> {
    /// Planner for real filesystem copies, set up from `config`
    pub fn from_config(config: &BackupConfig) -> Result<Self> {
        let executor = FsCopier::new()
            .with_follow_symlinks(config.follow_symlinks)
            .with_filter(config.ignore_filter()?);
        Self::from_config_with(config, executor)
    }
}

impl BackupPlanner<FsOracle, DryRunCopier> {
    /// Planner that only records the copies `config` would cause
    pub fn dry_run_from_config(config: &BackupConfig) -> Result<Self> {
        let executor = DryRunCopier::new().with_filter(config.ignore_filter()?);
        Self::from_config_with(config, executor)
    }
}

impl<E: CopyExecutor> BackupPlanner<FsOracle, E> {
    /// Filesystem oracle and options from `config`, copies through `executor`
    pub fn from_config_with(config: &BackupConfig, executor: E) -> Result<Self> {
        let oracle = FsOracle::new()
            .with_shallow(config.shallow)
            .with_follow_symlinks(config.follow_symlinks)
            .with_filter(config.ignore_filter()?);

        Ok(BackupPlanner::new(oracle, executor)
            .with_naming(config.naming)
            .with_error_policy(config.on_error))
    }
}

impl<O: ComparisonOracle, E: CopyExecutor> BackupPlanner<O, E> {
    /// Create a planner with default naming and error policy
    pub fn new(oracle: O, executor: E) -> Self {
        Self {
            oracle,
            executor,
            naming: DestinationNaming::default(),
            on_error: ErrorPolicy::default(),
        }
    }

    /// Set how backups are named under the destination root
    pub fn with_naming(mut self, naming: DestinationNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Set what happens when a target fails
    pub fn with_error_policy(mut self, on_error: ErrorPolicy) -> Self {
        self.on_error = on_error;
        self
    }

    /// Borrow the executor, e.g. to inspect a dry run
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Consume the planner and return its executor
    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Back up every target into `destination_root`
    ///
    /// # Errors
    ///
    /// - [`MirrorError::Io`] if the destination root cannot be created
    /// - the first target error when the policy is [`ErrorPolicy::Abort`]
    pub fn run(&mut self, destination_root: &Path, targets: &[BackupTarget]) -> Result<RunReport> {
        self.run_with_progress(destination_root, targets, None::<fn(&TargetReport)>)
    }

    /// Like [`run`](Self::run), calling `progress` after each target
    pub fn run_with_progress<F>(
        &mut self,
        destination_root: &Path,
        targets: &[BackupTarget],
        mut progress: Option<F>,
    ) -> Result<RunReport>
    where
        F: FnMut(&TargetReport),
    {
        info!("Starting backup into {:?} ({} targets)", destination_root, targets.len());
        let started_at = Utc::now();
        let start = Instant::now();

        if !self.oracle.exists(destination_root) {
            debug!("Creating backup destination dir: {:?}", destination_root);
            self.executor.make_dirs(destination_root)?;
        }

        let mut reports = Vec::with_capacity(targets.len());
        for target in targets {
            let kind = self.classify(&target.path);
            let destination = self
                .naming
                .backup_name(&target.path)
                .map(|name| destination_root.join(name));

            let outcome = match self.backup_target(target, kind, destination_root, destination.as_deref()) {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!("Backup of {:?} failed: {}", target.path, err);
                    if self.on_error == ErrorPolicy::Abort {
                        return Err(err);
                    }
                    TargetOutcome::Failed {
                        error: err.user_message(),
                    }
                }
            };

            let report = TargetReport {
                target: target.path.clone(),
                destination,
                kind,
                outcome,
            };
            if let Some(callback) = progress.as_mut() {
                callback(&report);
            }
            reports.push(report);
        }

        let report = RunReport {
            destination_root: destination_root.to_path_buf(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            dry_run: self.executor.is_dry_run(),
            targets: reports,
        };
        info!(
            "Making backup finished: {} files, {} trees copied, {} failed",
            report.files_copied(),
            report.trees_copied(),
            report.failed_count()
        );
        Ok(report)
    }

    fn classify(&self, path: &Path) -> TargetKind {
        if self.oracle.is_file(path) {
            TargetKind::File
        } else if self.oracle.is_dir(path) {
            TargetKind::Directory
        } else {
            TargetKind::Missing
        }
    }

    fn backup_target(
        &mut self,
        target: &BackupTarget,
        kind: TargetKind,
        destination_root: &Path,
        destination: Option<&Path>,
    ) -> Result<TargetOutcome> {
        let dst = match (kind, destination) {
            (TargetKind::Missing, _) => {
                warn!("Skipping {:?}: not an existing file or directory", target.path);
                return Ok(TargetOutcome::Skipped {
                    reason: "not an existing file or directory".to_string(),
                });
            }
            (_, None) => {
                warn!("Skipping {:?}: path has no base name", target.path);
                return Ok(TargetOutcome::Skipped {
                    reason: "path has no base name".to_string(),
                });
            }
            (_, Some(dst)) => dst,
        };

        match kind {
            TargetKind::File => self.backup_file(&target.path, dst),
            TargetKind::Directory if destination_root.starts_with(&target.path) => {
                warn!(
                    "Skipping {:?}: backup destination {:?} lies inside it",
                    target.path, destination_root
                );
                Ok(TargetOutcome::Skipped {
                    reason: "backup destination lies inside this directory".to_string(),
                })
            }
            TargetKind::Directory => self.backup_dir(&target.path, dst),
            TargetKind::Missing => Err(MirrorError::internal("missing target reached copy stage")),
        }
    }

    fn backup_file(&mut self, src: &Path, dst: &Path) -> Result<TargetOutcome> {
        if self.oracle.is_file(dst) && self.oracle.files_identical(src, dst)? {
            debug!("File {:?} was not changed. Skipped..", dst);
            return Ok(TargetOutcome::Unchanged);
        }

        debug!("Backup file {:?} to {:?}", src, dst);
        let bytes = self.executor.copy_file(src, dst)?;
        Ok(TargetOutcome::Copied {
            files: 1,
            trees: 0,
            bytes,
        })
    }

    fn backup_dir(&mut self, src: &Path, dst: &Path) -> Result<TargetOutcome> {
        if !self.oracle.exists(dst) {
            debug!("Backup dir {:?} to {:?}", src, dst);
            let bytes = self.executor.copy_tree(src, dst)?;
            return Ok(TargetOutcome::Copied {
                files: 0,
                trees: 1,
                bytes,
            });
        }
        if !self.oracle.is_dir(dst) {
            return Err(MirrorError::copy(
                src,
                dst,
                io::Error::new(io::ErrorKind::AlreadyExists, "backup exists and is not a directory"),
            ));
        }

        let diff = TreeDiffer::new(&self.oracle).diff(src, dst)?;
        if diff.is_empty() {
            debug!("Directory {:?} was not changed. Skipped..", dst);
            return Ok(TargetOutcome::Unchanged);
        }

        let mut bytes = 0;
        for pair in &diff.files {
            debug!("Backup file {:?} to {:?}", pair.src, pair.dst);
            bytes += self.executor.copy_file(&pair.src, &pair.dst)?;
        }
        for pair in &diff.dirs {
            debug!("Backup dir {:?} to {:?}", pair.src, pair.dst);
            bytes += self.executor.copy_tree(&pair.src, &pair.dst)?;
        }

        Ok(TargetOutcome::Copied {
            files: diff.files.len(),
            trees: diff.dirs.len(),
            bytes,
        })
    }
}
