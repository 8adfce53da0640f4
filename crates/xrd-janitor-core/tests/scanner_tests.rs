#![cfg(unix)]

use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use xrd_janitor_core::scanner::{prune_empty_dirs, scan};

/// Builds `width` directories per level, `depth` levels deep, with two files
/// and one link in every directory. Returns (dirs below root, files, links).
fn create_tree(root: &Path, depth: usize, width: usize) -> (usize, usize, usize) {
    fn fill(dir: &Path, depth: usize, width: usize, counts: &mut (usize, usize, usize)) {
        fs::write(dir.join("a.dat"), "a").unwrap();
        fs::write(dir.join("b.dat"), "b").unwrap();
        symlink(dir.join("a.dat"), dir.join("a.lnk")).unwrap();
        counts.1 += 2;
        counts.2 += 1;
        if depth == 0 {
            return;
        }
        for i in 0..width {
            let sub = dir.join(format!("d{}", i));
            fs::create_dir(&sub).unwrap();
            counts.0 += 1;
            fill(&sub, depth - 1, width, counts);
        }
    }

    let mut counts = (0, 0, 0);
    fill(root, depth, width, &mut counts);
    counts
}

#[test]
fn test_scan_is_complete_for_any_pool_size() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("tree");
    fs::create_dir(&root).unwrap();
    let (dirs, files, links) = create_tree(&root, 3, 3);

    for concurrency in [1, 2, 3, 8, 32] {
        let listings: Vec<_> = scan(&root, concurrency).unwrap().collect();

        // one listing per directory, the root included
        assert_eq!(listings.len(), dirs + 1, "pool size {}", concurrency);
        let visited: BTreeSet<PathBuf> = listings.iter().map(|l| l.path.clone()).collect();
        assert_eq!(visited.len(), dirs + 1);

        let emitted_dirs: usize = listings.iter().map(|l| l.dirs.len()).sum();
        let emitted_files: usize = listings.iter().map(|l| l.files.len()).sum();
        let emitted_links: usize = listings.iter().map(|l| l.links.len()).sum();
        assert_eq!(emitted_dirs, dirs);
        assert_eq!(emitted_files, files);
        assert_eq!(emitted_links, links);
    }
}

#[test]
fn test_link_to_directory_is_a_link() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::create_dir(root.join("real")).unwrap();
    fs::write(root.join("real/f"), "x").unwrap();
    symlink(root.join("real"), root.join("alias")).unwrap();

    let listings: Vec<_> = scan(root, 4).unwrap().collect();
    // the linked directory is not descended into
    assert_eq!(listings.len(), 2);
    let alias = root.join("alias");
    assert!(listings.iter().any(|l| l.links.contains(&alias)));
    assert!(!listings.iter().any(|l| l.dirs.contains(&alias)));
}

#[test]
fn test_scan_of_missing_root_is_empty() {
    let tmp = tempdir().unwrap();
    let listings: Vec<_> = scan(&tmp.path().join("missing"), 4).unwrap().collect();
    assert!(listings.is_empty());
}

#[test]
fn test_dropping_walk_early_does_not_hang() {
    let tmp = tempdir().unwrap();
    create_tree(tmp.path(), 3, 4);
    let mut walk = scan(tmp.path(), 4).unwrap();
    assert!(walk.next().is_some());
    drop(walk);
}

#[test]
fn test_unreadable_directory_is_reported_and_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempdir().unwrap();
    let locked = tmp.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::write(locked.join("hidden"), "x").unwrap();
    fs::write(tmp.path().join("visible"), "x").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // root can read anything; nothing to observe then
    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let walk = scan(tmp.path(), 2).unwrap();
    let errors = walk.errors();
    let files: Vec<PathBuf> = walk.flat_map(|l| l.files).collect();
    assert_eq!(files, vec![tmp.path().join("visible")]);
    assert_eq!(errors.try_iter().count(), 1);

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_prune_empty_dirs_keeps_root_and_populated_dirs() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("a/b/c")).unwrap();
    fs::create_dir_all(root.join("x/y")).unwrap();
    fs::write(root.join("x/keep"), "k").unwrap();

    let removed = prune_empty_dirs(root, 2).unwrap();
    assert_eq!(removed, 4);
    assert!(root.is_dir());
    assert!(!root.join("a").exists());
    assert!(root.join("x/keep").exists());
    assert!(!root.join("x/y").exists());
}
