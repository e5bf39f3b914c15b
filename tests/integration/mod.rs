//! Integration tests for mirrorup
//!
//! Exercise whole backup runs against real temporary directories: nested
//! trees, repeated runs, partial prior backups and failing targets.

use ::mirrorup::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Filesystem copier that counts what it is asked to do
#[derive(Default)]
pub struct CountingCopier {
    inner: FsCopier,
    pub files: Vec<CopyPair>,
    pub trees: Vec<CopyPair>,
}

impl CountingCopier {
    pub fn total(&self) -> usize {
        self.files.len() + self.trees.len()
    }
}

impl CopyExecutor for CountingCopier {
    fn copy_file(&mut self, src: &Path, dst: &Path) -> Result<u64> {
        self.files.push(CopyPair::new(src, dst));
        self.inner.copy_file(src, dst)
    }

    fn copy_tree(&mut self, src: &Path, dst: &Path) -> Result<u64> {
        self.trees.push(CopyPair::new(src, dst));
        self.inner.copy_tree(src, dst)
    }

    fn make_dirs(&mut self, path: &Path) -> Result<()> {
        self.inner.make_dirs(path)
    }
}

/// Source tree plus backup root in separate temporary directories
pub struct MirrorTestHarness {
    pub source_dir: TempDir,
    pub backup_dir: TempDir,
}

impl MirrorTestHarness {
    pub fn new() -> Self {
        Self {
            source_dir: TempDir::new().unwrap(),
            backup_dir: TempDir::new().unwrap(),
        }
    }

    /// Directory holding all targets
    pub fn source(&self) -> &Path {
        self.source_dir.path()
    }

    /// Destination root; created by the first run
    pub fn backup_root(&self) -> PathBuf {
        self.backup_dir.path().join("mirror")
    }

    /// Write `content` to `relative` under the source, creating parents
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.source().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Run a backup of `targets` with byte-exact comparison
    pub fn run(&self, targets: &[PathBuf]) -> (RunReport, CountingCopier) {
        let targets: Vec<BackupTarget> = targets.iter().cloned().map(BackupTarget::new).collect();
        let oracle = FsOracle::new().with_shallow(false);
        let mut planner = BackupPlanner::new(oracle, CountingCopier::default());
        let report = planner.run(&self.backup_root(), &targets).unwrap();
        (report, planner.into_executor())
    }
}

/// Map of relative path to content for every regular file under `root`
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    if !root.exists() {
        return files;
    }
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.unwrap();
        if entry.file_type().is_file() {
            let relative = entry.path().strip_prefix(root).unwrap().to_path_buf();
            files.insert(relative, fs::read(entry.path()).unwrap());
        }
    }
    files
}

/// Assert every file under `source` exists with equal bytes under `backup`
pub fn assert_converged(source: &Path, backup: &Path) {
    let expected = snapshot(source);
    let actual = snapshot(backup);
    for (path, content) in &expected {
        assert_eq!(
            actual.get(path),
            Some(content),
            "{:?} missing or different in backup",
            path
        );
    }
}

/// Map of relative path to link target for every symlink under `root`
pub fn link_targets(root: &Path) -> BTreeMap<PathBuf, PathBuf> {
    let mut links = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.unwrap();
        if entry.path_is_symlink() {
            let relative = entry.path().strip_prefix(root).unwrap().to_path_buf();
            links.insert(relative, fs::read_link(entry.path()).unwrap());
        }
    }
    links
}

/// Assert every symlink under `source` is mirrored with the same target
pub fn assert_links_converged(source: &Path, backup: &Path) {
    let expected = link_targets(source);
    let actual = link_targets(backup);
    for (path, target) in &expected {
        assert_eq!(actual.get(path), Some(target), "link {:?} not mirrored", path);
    }
}

#[test]
fn test_nested_tree_converges() {
    let harness = MirrorTestHarness::new();
    harness.write("project/README.md", "# project");
    harness.write("project/src/main.rs", "fn main() {}");
    harness.write("project/src/util/mod.rs", "pub mod fmt;");
    harness.write("project/src/util/fmt.rs", "pub fn f() {}");
    let project = harness.source().join("project");

    harness.run(&[project.clone()]);
    assert_converged(&project, &harness.backup_root().join("project"));

    harness.write("project/src/util/fmt.rs", "pub fn f() -> u8 { 1 }");
    harness.write("project/src/util/parse.rs", "pub fn p() {}");
    harness.write("project/docs/guide/intro.md", "hello");

    let (report, copier) = harness.run(&[project.clone()]);
    assert_converged(&project, &harness.backup_root().join("project"));
    assert_eq!(copier.files.len(), 2);
    assert_eq!(copier.trees.len(), 1);
    assert_eq!(copier.trees[0].src, project.join("docs"));
    assert_eq!(report.files_copied(), 2);
}

#[test]
fn test_second_run_is_noop() {
    let harness = MirrorTestHarness::new();
    harness.write("data/a.txt", "a");
    harness.write("data/deep/b.txt", "b");
    let single = harness.write("single.cfg", "key=value");
    let targets = [harness.source().join("data"), single];

    let (first, copier) = harness.run(&targets);
    assert_eq!(copier.total(), 2);
    assert_eq!(first.trees_copied(), 1);
    assert_eq!(first.files_copied(), 1);

    let (second, copier) = harness.run(&targets);
    assert_eq!(copier.total(), 0);
    assert!(second
        .targets
        .iter()
        .all(|t| t.outcome == TargetOutcome::Unchanged));
}

#[test]
fn test_destination_only_files_survive() {
    let harness = MirrorTestHarness::new();
    harness.write("docs/keep.txt", "keep");
    harness.write("docs/sub/remove.txt", "remove me");
    let docs = harness.source().join("docs");
    harness.run(&[docs.clone()]);

    fs::remove_file(docs.join("sub/remove.txt")).unwrap();
    fs::remove_dir(docs.join("sub")).unwrap();
    let extra = harness.backup_root().join("docs/manual-note.txt");
    fs::write(&extra, "added by hand").unwrap();

    let (report, copier) = harness.run(&[docs]);
    assert_eq!(copier.total(), 0);
    assert!(!report.has_failures());
    assert_eq!(
        fs::read_to_string(harness.backup_root().join("docs/sub/remove.txt")).unwrap(),
        "remove me"
    );
    assert_eq!(fs::read_to_string(&extra).unwrap(), "added by hand");
}

#[test]
fn test_new_subtree_copied_as_one_unit() {
    let harness = MirrorTestHarness::new();
    harness.write("photos/index.txt", "index");
    let photos = harness.source().join("photos");
    harness.run(&[photos.clone()]);

    for i in 0..10 {
        harness.write(&format!("photos/2024/trip/img_{}.raw", i), "pixels");
    }
    let (_, copier) = harness.run(&[photos.clone()]);

    assert_eq!(copier.trees.len(), 1);
    assert!(copier.files.is_empty());
    assert_eq!(copier.trees[0].src, photos.join("2024"));
    assert_converged(&photos, &harness.backup_root().join("photos"));
}

#[test]
fn test_partial_prior_backup_is_completed() {
    let harness = MirrorTestHarness::new();
    harness.write("work/a/1.txt", "1");
    harness.write("work/a/2.txt", "2");
    harness.write("work/b/3.txt", "3");
    let work = harness.source().join("work");

    // Simulate a run interrupted after copying only part of the tree
    let partial = harness.backup_root().join("work/a");
    fs::create_dir_all(&partial).unwrap();
    fs::write(partial.join("1.txt"), "1").unwrap();

    let (_, copier) = harness.run(&[work.clone()]);
    assert_eq!(copier.files, vec![CopyPair::new(work.join("a/2.txt"), partial.join("2.txt"))]);
    assert_eq!(
        copier.trees,
        vec![CopyPair::new(work.join("b"), harness.backup_root().join("work/b"))]
    );
    assert_converged(&work, &harness.backup_root().join("work"));
}

#[test]
fn test_deep_tree_does_not_overflow() {
    let harness = MirrorTestHarness::new();
    let mut relative = String::from("deep");
    for i in 0..200 {
        relative.push_str(&format!("/d{}", i % 10));
    }
    harness.write(&format!("{}/leaf.txt", relative), "bottom");
    let deep = harness.source().join("deep");
    harness.run(&[deep.clone()]);

    harness.write(&format!("{}/leaf.txt", relative), "new bottom");
    let (_, copier) = harness.run(&[deep]);
    assert_eq!(copier.files.len(), 1);
    assert!(copier.files[0].dst.ends_with("leaf.txt"));
}

#[test]
fn test_targets_processed_in_order_with_duplicates() {
    let harness = MirrorTestHarness::new();
    let a = harness.write("a.txt", "a");
    let b = harness.write("b.txt", "b");

    let (report, copier) = harness.run(&[b.clone(), a.clone(), b.clone()]);
    let order: Vec<_> = report.targets.iter().map(|t| t.target.clone()).collect();
    assert_eq!(order, vec![b.clone(), a, b]);
    assert_eq!(copier.files.len(), 2);
    assert_eq!(report.targets[2].outcome, TargetOutcome::Unchanged);
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_fails_only_its_target() {
    use std::os::unix::fs::PermissionsExt;

    let harness = MirrorTestHarness::new();
    harness.write("locked/inner/file.txt", "secret");
    let other = harness.write("other.txt", "fine");
    let locked = harness.source().join("locked");
    harness.run(&[locked.clone()]);

    let inner = locked.join("inner");
    fs::set_permissions(&inner, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&inner).is_ok() {
        // Running with privileges that bypass permissions
        fs::set_permissions(&inner, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let (report, copier) = harness.run(&[locked.clone(), other]);
    fs::set_permissions(&inner, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(report.targets[0].outcome.is_failure());
    assert!(matches!(report.targets[1].outcome, TargetOutcome::Copied { files: 1, .. }));
    assert_eq!(copier.files.len(), 1);
}

#[test]
fn test_config_file_end_to_end() {
    let harness = MirrorTestHarness::new();
    harness.write("notes/todo.txt", "buy milk");
    harness.write("notes/.cache/blob", "junk");
    let hosts = harness.write("hosts", "127.0.0.1 localhost");

    let config_path = harness.backup_dir.path().join("backup.toml");
    let config_text = format!(
        "backup_dest = {:?}\npaths = [{:?}, {:?}]\nignore = [\".cache\"]\n",
        harness.backup_root().to_str().unwrap(),
        harness.source().join("notes").to_str().unwrap(),
        hosts.to_str().unwrap(),
    );
    fs::write(&config_path, config_text).unwrap();

    let config = BackupConfig::load(&config_path).unwrap();
    let mut planner = BackupPlanner::from_config(&config).unwrap();
    let report = planner.run(&config.backup_dest, &config.targets).unwrap();

    assert!(!report.has_failures());
    let root = harness.backup_root();
    assert_eq!(fs::read_to_string(root.join("notes/todo.txt")).unwrap(), "buy milk");
    assert_eq!(fs::read_to_string(root.join("hosts")).unwrap(), "127.0.0.1 localhost");
    assert!(!root.join("notes/.cache").exists());

    let again = planner.run(&config.backup_dest, &config.targets).unwrap();
    assert_eq!(again.files_copied() + again.trees_copied(), 0);
}

#[cfg(unix)]
#[test]
fn test_unchanged_and_new_links() {
    use std::os::unix::fs::symlink;

    let harness = MirrorTestHarness::new();
    harness.write("linked/real.txt", "REAL");
    let linked = harness.source().join("linked");
    symlink("real.txt", linked.join("link")).unwrap();
    let backup = harness.backup_root().join("linked");

    harness.run(&[linked.clone()]);
    assert_links_converged(&linked, &backup);

    let (report, copier) = harness.run(&[linked.clone()]);
    assert_eq!(copier.total(), 0);
    assert_eq!(report.targets[0].outcome, TargetOutcome::Unchanged);

    symlink("real.txt", linked.join("late")).unwrap();
    let (_, copier) = harness.run(&[linked.clone()]);
    assert_eq!(copier.files, vec![CopyPair::new(linked.join("late"), backup.join("late"))]);
    assert!(fs::symlink_metadata(backup.join("late")).unwrap().file_type().is_symlink());
    assert_converged(&linked, &backup);
    assert_links_converged(&linked, &backup);
}

#[cfg(unix)]
#[test]
fn test_retargeted_relative_link() {
    use std::os::unix::fs::symlink;

    let harness = MirrorTestHarness::new();
    harness.write("D/real.txt", "REAL");
    harness.write("D/other.txt", "OTHER CONTENT");
    let d = harness.source().join("D");
    symlink("real.txt", d.join("link")).unwrap();
    let backup = harness.backup_root().join("D");
    harness.run(&[d.clone()]);

    fs::remove_file(d.join("link")).unwrap();
    symlink("other.txt", d.join("link")).unwrap();
    let source_before = snapshot(&d);

    let (report, copier) = harness.run(&[d.clone()]);

    assert!(matches!(report.targets[0].outcome, TargetOutcome::Copied { files: 1, trees: 0, .. }));
    assert_eq!(copier.files, vec![CopyPair::new(d.join("link"), backup.join("link"))]);
    assert_eq!(fs::read_to_string(backup.join("real.txt")).unwrap(), "REAL");
    assert_eq!(fs::read_link(backup.join("link")).unwrap(), PathBuf::from("other.txt"));
    assert_eq!(snapshot(&d), source_before);
    assert_converged(&d, &backup);
    assert_links_converged(&d, &backup);

    let (_, copier) = harness.run(&[d]);
    assert_eq!(copier.total(), 0);
}

#[cfg(unix)]
#[test]
fn test_absolute_link_never_written_through() {
    use std::os::unix::fs::symlink;

    let harness = MirrorTestHarness::new();
    let outside = TempDir::new().unwrap();
    let precious = outside.path().join("precious.txt");
    let fresh = outside.path().join("fresh.txt");
    fs::write(&precious, "precious").unwrap();
    fs::write(&fresh, "fresh").unwrap();
    let outside_before = snapshot(outside.path());

    harness.write("abs/plain.txt", "plain");
    let dir = harness.source().join("abs");
    symlink(&precious, dir.join("pointer")).unwrap();
    let backup = harness.backup_root().join("abs");
    harness.run(&[dir.clone()]);

    // Retarget to another file outside the tree
    fs::remove_file(dir.join("pointer")).unwrap();
    symlink(&fresh, dir.join("pointer")).unwrap();
    harness.run(&[dir.clone()]);
    assert_eq!(fs::read_link(backup.join("pointer")).unwrap(), fresh);
    assert_eq!(snapshot(outside.path()), outside_before);

    // Replace the link with a regular file
    fs::remove_file(dir.join("pointer")).unwrap();
    harness.write("abs/pointer", "replaced");
    let (report, _) = harness.run(&[dir.clone()]);

    assert!(!report.has_failures());
    assert!(!fs::symlink_metadata(backup.join("pointer")).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_to_string(backup.join("pointer")).unwrap(), "replaced");
    assert_eq!(snapshot(outside.path()), outside_before);
    assert_converged(&dir, &backup);
}
