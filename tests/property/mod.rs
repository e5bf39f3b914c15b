//! Property-based testing for mirrorup
//!
//! Random source trees are backed up, mutated and backed up again. After
//! every run the backup must contain the source byte for byte, and a run
//! with no intervening changes must copy nothing.

use super::integration::{assert_converged, snapshot, MirrorTestHarness};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Generate random relative file paths
fn path_strategy() -> impl Strategy<Value = PathBuf> {
    let dir_strategy = prop::collection::vec("[a-d]{1,2}", 0..=3);
    let filename_strategy = "f[0-9]{1,2}\\.(txt|md)";

    (dir_strategy, filename_strategy).prop_map(|(dirs, filename)| {
        let mut path = PathBuf::new();
        for dir in dirs {
            path.push(dir);
        }
        path.join(filename)
    })
}

/// Generate random file content
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        "[a-zA-Z0-9 \n]{0,200}".prop_map(|s| s.into_bytes()),
        prop::collection::vec(any::<u8>(), 0..2000),
    ]
}

/// Create a file unless a file/directory clash prevents it
///
/// Directory names and file names come from disjoint alphabets, so a clash
/// can only be a leftover from an earlier operation; such writes are skipped.
fn create(root: &Path, relative: &Path, content: &[u8]) {
    let full = root.join(relative);
    if let Some(parent) = full.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    if !full.is_dir() {
        fs::write(full, content).unwrap();
    }
}

#[derive(Debug, Clone)]
enum Mutation {
    Rewrite { index: usize, content: Vec<u8> },
    Delete { index: usize },
    Add { path: PathBuf, content: Vec<u8> },
}

fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        (any::<usize>(), content_strategy()).prop_map(|(index, content)| Mutation::Rewrite { index, content }),
        any::<usize>().prop_map(|index| Mutation::Delete { index }),
        (path_strategy(), content_strategy()).prop_map(|(path, content)| Mutation::Add { path, content }),
    ]
}

fn apply(root: &Path, mutation: &Mutation) {
    let existing: Vec<PathBuf> = snapshot(root).into_keys().collect();
    match mutation {
        Mutation::Rewrite { index, content } if !existing.is_empty() => {
            fs::write(root.join(&existing[index % existing.len()]), content).unwrap();
        }
        Mutation::Delete { index } if !existing.is_empty() => {
            fs::remove_file(root.join(&existing[index % existing.len()])).unwrap();
        }
        // New files go under a prefix the initial tree never uses, so a path
        // deleted from the source can never come back as the other type
        Mutation::Add { path, content } => create(root, &Path::new("added").join(path), content),
        _ => {}
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Two runs with mutations in between: convergence, idempotence, no deletion
    #[test]
    fn backup_converges_and_is_idempotent(
        files in prop::collection::vec((path_strategy(), content_strategy()), 1..30),
        mutations in prop::collection::vec(mutation_strategy(), 0..20),
    ) {
        let harness = MirrorTestHarness::new();
        let tree = harness.source().join("tree");
        fs::create_dir_all(&tree).unwrap();
        for (path, content) in &files {
            create(&tree, path, content);
        }
        let backup = harness.backup_root().join("tree");

        harness.run(&[tree.clone()]);
        assert_converged(&tree, &backup);
        let before: BTreeMap<PathBuf, Vec<u8>> = snapshot(&backup);

        for mutation in &mutations {
            apply(&tree, mutation);
        }
        harness.run(&[tree.clone()]);
        assert_converged(&tree, &backup);

        // Nothing that was backed up disappears
        let after = snapshot(&backup);
        for path in before.keys() {
            prop_assert!(after.contains_key(path));
        }

        let (_, copier) = harness.run(&[tree.clone()]);
        prop_assert_eq!(copier.total(), 0);
    }
}
