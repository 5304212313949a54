//! Bulk-load pipeline against real directory trees and large synthetic streams.

use std::fs;
use std::path::Path;

use fileindex::core::config::{LoaderConfig, WalkerSettings};
use fileindex::index::searcher::{Searcher, key_counts};
use fileindex::loader::bulk::BulkLoader;
use fileindex::loader::walker::{DirectoryWalker, FileRecord, WalkerConfig};
use tempfile::TempDir;

fn loader(workers: usize, batch_size: usize) -> BulkLoader {
    BulkLoader::new(LoaderConfig {
        workers,
        batch_size,
        channel_capacity: 1_000,
    })
}

/// `dirs` directories with `per_dir` files each; every directory repeats the same names.
fn populate(root: &Path, dirs: usize, per_dir: usize) {
    for d in 0..dirs {
        let dir = root.join(format!("dir{d:02}"));
        fs::create_dir_all(&dir).expect("mkdir");
        for f in 0..per_dir {
            fs::write(dir.join(format!("File{f:03}.log")), b"x").expect("write");
        }
    }
}

#[test]
fn ten_thousand_synthetic_records_with_four_workers() {
    let records = (0..10_000).map(|i| {
        let name = format!("entry{i:05}.dat");
        FileRecord::file(name.clone(), format!("/synthetic/{}/{name}", i % 97))
    });

    let outcome = loader(4, 50).load_records(records).expect("load");
    let stats = &outcome.stats;
    assert_eq!(stats.total_files, 10_000);
    assert_eq!(stats.distinct_keys, 10_000);
    assert_eq!(stats.workers, 4);
    // Each worker flushes at most one partial batch.
    assert!(stats.batches >= 200 && stats.batches <= 204, "{}", stats.batches);

    outcome.index.validate().expect("valid tree");
    let searcher = Searcher::new(&outcome.index);
    assert_eq!(searcher.count(), 10_000);
    assert_eq!(searcher.exact("ENTRY04242.DAT"), ["/synthetic/71/entry04242.dat"]);
    assert_eq!(searcher.prefix("entry0999").len(), 10);
}

#[test]
fn directory_tree_is_fully_indexed() {
    let tmp = TempDir::new().expect("tempdir");
    populate(tmp.path(), 12, 40);

    let outcome = loader(4, 16).load(tmp.path()).expect("load");
    // 12 directories plus 480 files.
    assert_eq!(outcome.stats.total_files, 492);
    assert_eq!(outcome.stats.distinct_keys, 52);
    assert_eq!(outcome.stats.skipped_entries, 0);
    outcome.index.validate().expect("valid tree");

    let searcher = Searcher::new(&outcome.index);
    let hits = searcher.exact("file007.LOG");
    assert_eq!(hits.len(), 12);
    assert!(hits.iter().all(|p| Path::new(p).is_absolute()));
    assert_eq!(searcher.directories("dir").len(), 12);
    assert_eq!(searcher.files_only("dir").len(), 0);

    for (key, count) in key_counts(&outcome.index) {
        let expected = if key.starts_with("dir") { 1 } else { 12 };
        assert_eq!(count, expected, "key {key}");
    }
}

#[test]
fn worker_count_does_not_change_the_result() {
    let tmp = TempDir::new().expect("tempdir");
    populate(tmp.path(), 5, 30);

    let single = loader(1, 7).load(tmp.path()).expect("load");
    let many = loader(8, 7).load(tmp.path()).expect("load");

    let keys = |outcome: &fileindex::loader::bulk::LoadOutcome| -> Vec<(String, usize)> {
        key_counts(&outcome.index)
            .map(|(k, n)| (k.to_string(), n))
            .collect()
    };
    assert_eq!(keys(&single), keys(&many));
    assert_eq!(single.stats.total_files, many.stats.total_files);
}

#[test]
fn walker_settings_shape_what_is_indexed() {
    let tmp = TempDir::new().expect("tempdir");
    populate(tmp.path(), 3, 2);
    fs::create_dir_all(tmp.path().join("dir00").join("nested")).expect("mkdir");
    fs::write(tmp.path().join("dir00").join("nested").join("deep.txt"), b"x").expect("write");

    let settings = WalkerSettings {
        max_depth: Some(1),
        include_directories: false,
        ..WalkerSettings::default()
    };
    let walker = DirectoryWalker::new(WalkerConfig::from_settings(tmp.path(), &settings));
    let outcome = loader(2, 4).load_with_walker(&walker).expect("load");

    let searcher = Searcher::new(&outcome.index);
    assert_eq!(outcome.stats.total_files, 6);
    assert!(!searcher.exists("deep.txt"));
    assert!(searcher.directories("").is_empty());
}

#[test]
fn empty_directory_yields_empty_index() {
    let tmp = TempDir::new().expect("tempdir");
    let outcome = loader(3, 50).load(tmp.path()).expect("load");
    assert!(outcome.index.is_empty());
    assert_eq!(outcome.stats.total_files, 0);
    assert!(Searcher::new(&outcome.index).all_entries().is_empty());
}

#[test]
fn file_root_is_rejected() {
    let tmp = TempDir::new().expect("tempdir");
    let file = tmp.path().join("plain.txt");
    fs::write(&file, b"x").expect("write");

    let err = loader(2, 50).load(&file).unwrap_err();
    assert_eq!(err.code(), "FIDX-3002");
}
