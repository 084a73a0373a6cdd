use std::fs;
use std::path::{Path, PathBuf};

use sysclean::model::AuditRecord;
use sysclean::{Cleaner, Item, ItemKind, Outcome, RiskLevel};

fn file_item(root: &Path, name: &str, contents: &[u8]) -> Item {
    let path = root.join(name);
    fs::write(&path, contents).unwrap();
    Item::new(
        "temp_files",
        ItemKind::File,
        path.to_string_lossy(),
        root.to_string_lossy(),
        RiskLevel::Safe,
    )
    .with_size(contents.len() as u64)
}

fn dir_item(root: &Path, name: &str) -> Item {
    let path = root.join(name);
    fs::create_dir_all(path.join("nested")).unwrap();
    fs::write(path.join("nested/a.bin"), b"abc").unwrap();
    Item::new(
        "caches",
        ItemKind::Directory,
        path.to_string_lossy(),
        root.to_string_lossy(),
        RiskLevel::Safe,
    )
    .with_size(3)
}

fn log_rows(path: &Path) -> Vec<Vec<String>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap()
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<(PathBuf, Vec<u8>)> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| (e.path().to_path_buf(), fs::read(e.path()).unwrap()))
        .collect();
    files.sort();
    files
}

fn outcomes(records: &[AuditRecord]) -> Vec<(String, Outcome)> {
    records.iter().map(|r| (r.path.clone(), r.outcome)).collect()
}

#[test]
fn every_attempt_is_logged_in_order() {
    let root = tempfile::tempdir().unwrap();
    let items = vec![
        file_item(root.path(), "a.tmp", b"aaaa"),
        Item::new(
            "temp_files",
            ItemKind::File,
            "relative/b.tmp",
            root.path().to_string_lossy(),
            RiskLevel::Safe,
        ),
        dir_item(root.path(), "cache"),
    ];
    let log = root.path().join("audit").join("run.csv");

    let records = Cleaner::new().delete_selected(&items, false, &log).unwrap();

    let rows = log_rows(&log);
    assert_eq!(rows.len(), 3);
    for ((row, record), item) in rows.iter().zip(&records).zip(&items) {
        assert_eq!(row[1], item.path);
        assert_eq!(row[4], record.outcome.as_str());
        assert_eq!(row.len(), 6);
    }
    assert_eq!(records[0].outcome, Outcome::Succeeded);
    assert_eq!(records[1].outcome, Outcome::Failed);
    assert!(!rows[1][5].is_empty());
    assert_eq!(records[2].outcome, Outcome::Succeeded);
    assert_eq!(rows[0][3], "4");
}

#[test]
fn dry_run_leaves_everything_in_place() {
    let root = tempfile::tempdir().unwrap();
    let items = vec![
        file_item(root.path(), "a.tmp", b"first"),
        dir_item(root.path(), "cache"),
    ];
    let before = snapshot(root.path());
    let log_dir = tempfile::tempdir().unwrap();
    let log = log_dir.path().join("dry.csv");

    let records = Cleaner::new().delete_selected(&items, true, &log).unwrap();

    assert_eq!(snapshot(root.path()), before);
    assert!(records.iter().all(|r| r.outcome == Outcome::SucceededDryRun));
    let rows = log_rows(&log);
    assert!(rows.iter().all(|row| row[4] == "SUCCEEDED-DRYRUN"));
}

#[test]
fn split_runs_match_a_single_run() {
    let one = tempfile::tempdir().unwrap();
    let two = tempfile::tempdir().unwrap();
    let build = |root: &Path| {
        vec![
            file_item(root, "a.tmp", b"a"),
            dir_item(root, "b"),
            file_item(root, "c.tmp", b"ccc"),
        ]
    };
    let whole = build(one.path());
    let parts = build(two.path());
    let logs = tempfile::tempdir().unwrap();

    let cleaner = Cleaner::new();
    let single = cleaner
        .delete_selected(&whole, false, &logs.path().join("single.csv"))
        .unwrap();
    let mut split = cleaner
        .delete_selected(&parts[..1], false, &logs.path().join("split.csv"))
        .unwrap();
    split.extend(
        cleaner
            .delete_selected(&parts[1..], false, &logs.path().join("split.csv"))
            .unwrap(),
    );

    let strip = |records: &[AuditRecord], root: &Path| -> Vec<(String, Outcome)> {
        outcomes(records)
            .into_iter()
            .map(|(p, o)| (p.replace(&*root.to_string_lossy(), ""), o))
            .collect()
    };
    assert_eq!(strip(&single, one.path()), strip(&split, two.path()));
    assert_eq!(snapshot(one.path()), Vec::new());
    assert_eq!(snapshot(two.path()), Vec::new());
    assert_eq!(log_rows(&logs.path().join("split.csv")).len(), 3);
}

#[test]
fn already_removed_item_counts_as_done() {
    let root = tempfile::tempdir().unwrap();
    let item = file_item(root.path(), "gone.tmp", b"x");
    fs::remove_file(&item.path).unwrap();
    let log = root.path().join("log.csv");

    let records = Cleaner::new()
        .delete_selected(std::slice::from_ref(&item), false, &log)
        .unwrap();
    assert_eq!(records[0].outcome, Outcome::Succeeded);
    assert_eq!(records[0].error, None);
}

#[cfg(unix)]
#[test]
fn symlink_out_of_the_scan_root_is_refused() {
    let outside = tempfile::tempdir().unwrap();
    fs::write(outside.path().join("precious.txt"), b"keep me").unwrap();
    let root = tempfile::tempdir().unwrap();
    let link = root.path().join("link");
    std::os::unix::fs::symlink(outside.path(), &link).unwrap();

    let item = Item::new(
        "caches",
        ItemKind::Directory,
        link.to_string_lossy(),
        root.path().to_string_lossy(),
        RiskLevel::Safe,
    );
    let log = root.path().join("log.csv");
    let records = Cleaner::new()
        .delete_selected(std::slice::from_ref(&item), false, &log)
        .unwrap();

    assert_eq!(records[0].outcome, Outcome::Failed);
    assert!(outside.path().join("precious.txt").exists());
    assert!(link.exists());
}
