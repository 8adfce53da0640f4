#![cfg(unix)]

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use tempfile::tempdir;

use chrono::{Local, TimeZone};
use xrd_janitor_core::dedup::{
    collect_lists, emit_entries, find_duplicates, remove_on_server, LocalEntrySource, ServerSpec,
};
use xrd_janitor_core::transport::RemoteShell;
use xrd_janitor_core::{AppConfig, SilentReporter};

/// A namespace under `root/name` with one link per key, each pointing into
/// `root/name-data`.
fn create_server(root: &Path, name: &str, keys: &[&str]) -> ServerSpec {
    let ns = root.join(name);
    let data = root.join(format!("{}-data", name));
    for key in keys {
        let link = ns.join(key);
        let file = data.join(key);
        fs::create_dir_all(link.parent().unwrap()).unwrap();
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, key).unwrap();
        symlink(&file, &link).unwrap();
    }
    fs::create_dir_all(&ns).unwrap();
    ServerSpec::parse(&format!("localhost{}", ns.display()), "root", 22).unwrap()
}

#[test]
fn test_first_server_is_authoritative() {
    let tmp = tempdir().unwrap();
    let a = create_server(tmp.path(), "a", &["x", "sub/y", "z"]);
    let b = create_server(tmp.path(), "b", &["sub/y"]);
    let c = create_server(tmp.path(), "c", &["sub/y", "z"]);

    let plan = find_duplicates(
        &[a.clone(), b.clone(), c.clone()],
        &LocalEntrySource::new(2),
        &SilentReporter,
    )
    .unwrap();

    assert_eq!(plan.groups, 2);
    assert!(plan.removals[0].is_empty());
    assert_eq!(plan.removals[1], vec![format!("{}sub/y", b.namespace)]);
    assert_eq!(
        plan.removals[2],
        vec![format!("{}sub/y", c.namespace), format!("{}z", c.namespace)]
    );
}

#[test]
fn test_lowest_index_wins_without_authority() {
    let tmp = tempdir().unwrap();
    let a = create_server(tmp.path(), "a", &["only-a"]);
    let b = create_server(tmp.path(), "b", &["k"]);
    let c = create_server(tmp.path(), "c", &["k"]);

    let plan = find_duplicates(&[a, b, c.clone()], &LocalEntrySource::new(2), &SilentReporter)
        .unwrap();
    assert!(plan.removals[1].is_empty());
    assert_eq!(plan.removals[2], vec![format!("{}k", c.namespace)]);
}

#[test]
fn test_batched_removal_deletes_link_and_target() {
    let tmp = tempdir().unwrap();
    let keys = ["one", "two", "it's", "three"];
    let server = create_server(tmp.path(), "srv", &keys);
    let entries: Vec<String> = keys
        .iter()
        .map(|key| format!("{}{}", server.namespace, key))
        .collect();

    let shell = RemoteShell::from_config(&AppConfig::default());
    let failed = remove_on_server(&shell, &server, &entries[..3], 2, &SilentReporter);
    assert_eq!(failed, 0);

    let data = tmp.path().join("srv-data");
    for key in &keys[..3] {
        assert!(fs::symlink_metadata(tmp.path().join("srv").join(key)).is_err());
        assert!(!data.join(key).exists());
    }
    assert!(data.join("three").exists());
    assert!(tmp.path().join("srv/three").exists());
}

#[test]
fn test_collect_writes_per_server_and_combined_lists() {
    let tmp = tempdir().unwrap();
    let a = create_server(tmp.path(), "a", &["x", "y"]);
    let b = create_server(tmp.path(), "b", &["y", "z"]);
    let out = tmp.path().join("lists");
    fs::create_dir(&out).unwrap();

    let now = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
    let summary = collect_lists(&[a, b], &LocalEntrySource::new(2), &out, now).unwrap();

    assert_eq!(summary.distinct_entries, 3);
    assert_eq!(
        summary.all_servers_file,
        out.join("ALL_SERVERS-2024-03-01T12:30:00_file_list.txt")
    );
    let combined = fs::read_to_string(&summary.all_servers_file).unwrap();
    assert_eq!(combined, "List from 2024-03-01T12:30:00\nx\ny\nz\n");

    let counts: Vec<usize> = summary.server_files.iter().map(|(_, _, n)| *n).collect();
    assert_eq!(counts, vec![2, 2]);

    // both servers are localhost, so the second list replaces the first
    let (name, path, _) = &summary.server_files[1];
    assert_eq!(name, "localhost");
    assert_eq!(path, &out.join("localhost-2024-03-01T12:30:00_file_list.txt"));
    assert_eq!(
        fs::read_to_string(path).unwrap(),
        "List from 2024-03-01T12:30:00\ny\nz\n"
    );
}

#[test]
fn test_emit_entries_is_nul_separated() {
    let tmp = tempdir().unwrap();
    let server = create_server(tmp.path(), "ns", &["a", "d/b"]);
    let mut out = Vec::new();

    let emitted = emit_entries(Path::new(&server.namespace), 2, &mut out).unwrap();
    assert_eq!(emitted, 2);

    let mut entries: Vec<&[u8]> = out.split(|b| *b == 0).filter(|e| !e.is_empty()).collect();
    entries.sort();
    assert_eq!(
        entries,
        vec![
            format!("{}a", server.namespace).as_bytes(),
            format!("{}d/b", server.namespace).as_bytes()
        ]
    );
}
