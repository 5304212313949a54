//! Read-only queries over a fully loaded [`NameIndex`].
//!
//! Every query normalizes its term the same way insertion does. Results come
//! back in ascending key order; paths sharing a key keep their stored order.
//! Absence is an empty result, never an error.

#![allow(missing_docs)]

use crate::index::tree::normalize_key;
use crate::index::{IndexedPath, NameIndex};

/// Query facade borrowing a stable index.
#[derive(Debug, Clone, Copy)]
pub struct Searcher<'a> {
    index: &'a NameIndex,
}

impl<'a> Searcher<'a> {
    pub const fn new(index: &'a NameIndex) -> Self {
        Self { index }
    }

    /// Paths stored under exactly `name` (case-insensitive).
    pub fn exact(&self, name: &str) -> Vec<&'a str> {
        paths(self.exact_records(name))
    }

    /// Records stored under exactly `name`. One leaf is searched.
    pub fn exact_records(&self, name: &str) -> Vec<&'a IndexedPath> {
        let key = normalize_key(name);
        self.index
            .find_leaf(&key)
            .get(&key)
            .map(|entry| entry.values().iter().collect())
            .unwrap_or_default()
    }

    /// Whether any path is stored under `name`.
    pub fn exists(&self, name: &str) -> bool {
        !self.exact_records(name).is_empty()
    }

    /// Paths whose name contains `substring`. Scans the whole leaf chain.
    pub fn partial(&self, substring: &str) -> Vec<&'a str> {
        paths(self.partial_records(substring))
    }

    pub fn partial_records(&self, substring: &str) -> Vec<&'a IndexedPath> {
        let needle = normalize_key(substring);
        self.collect(|key| key.contains(needle.as_str()))
    }

    /// Paths whose name starts with `prefix`.
    pub fn prefix(&self, prefix: &str) -> Vec<&'a str> {
        paths(self.prefix_records(prefix))
    }

    pub fn prefix_records(&self, prefix: &str) -> Vec<&'a IndexedPath> {
        let prefix = normalize_key(prefix);
        self.collect(|key| key.starts_with(prefix.as_str()))
    }

    /// Every stored path, ordered by name.
    pub fn all_entries(&self) -> Vec<&'a str> {
        paths(self.all_records())
    }

    pub fn all_records(&self) -> Vec<&'a IndexedPath> {
        self.collect(|_| true)
    }

    /// Directories whose name contains `term`.
    pub fn directories(&self, term: &str) -> Vec<&'a str> {
        paths(self.partial_of_kind(term, true))
    }

    /// Non-directory paths whose name contains `term`.
    pub fn files_only(&self, term: &str) -> Vec<&'a str> {
        paths(self.partial_of_kind(term, false))
    }

    /// Substring matches restricted to directories (`is_dir`) or to everything else.
    pub fn partial_of_kind(&self, term: &str, is_dir: bool) -> Vec<&'a IndexedPath> {
        let mut records = self.partial_records(term);
        records.retain(|record| record.is_dir == is_dir);
        records
    }

    /// Total number of stored paths.
    pub fn count(&self) -> usize {
        self.index.value_count()
    }

    fn collect<F>(&self, mut matches: F) -> Vec<&'a IndexedPath>
    where
        F: FnMut(&str) -> bool,
    {
        let index: &'a NameIndex = self.index;
        let mut out = Vec::new();
        for leaf in index.leaves() {
            for entry in leaf.entries() {
                if matches(entry.key()) {
                    out.extend(entry.values());
                }
            }
        }
        out
    }
}

fn paths(records: Vec<&IndexedPath>) -> Vec<&str> {
    records.into_iter().map(|r| r.path.as_str()).collect()
}

/// Keys and path counts, ascending, for summaries.
pub fn key_counts(index: &NameIndex) -> impl Iterator<Item = (&str, usize)> + '_ {
    index
        .entries()
        .map(|entry| (entry.key(), entry.values().len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NameIndex {
        let mut index = NameIndex::new();
        index.insert("a.txt", IndexedPath::file("/x/a.txt"));
        index.insert("B.txt", IndexedPath::file("/y/B.txt"));
        index.insert("ab.txt", IndexedPath::file("/z/ab.txt"));
        index
    }

    #[test]
    fn exact_is_case_insensitive() {
        let index = sample();
        let searcher = Searcher::new(&index);
        assert_eq!(searcher.exact("A.TXT"), ["/x/a.txt"]);
        assert!(searcher.exact("missing.txt").is_empty());
        assert!(searcher.exact("").is_empty());
    }

    #[test]
    fn prefix_returns_key_order() {
        let index = sample();
        let searcher = Searcher::new(&index);
        assert_eq!(searcher.prefix("a"), ["/x/a.txt", "/z/ab.txt"]);
    }

    #[test]
    fn all_entries_sorted_by_key() {
        let index = sample();
        let searcher = Searcher::new(&index);
        assert_eq!(
            searcher.all_entries(),
            ["/x/a.txt", "/z/ab.txt", "/y/B.txt"]
        );
    }

    #[test]
    fn empty_term_matches_everything_for_scans() {
        let index = sample();
        let searcher = Searcher::new(&index);
        assert_eq!(searcher.partial("").len(), 3);
        assert_eq!(searcher.prefix("").len(), 3);
    }

    #[test]
    fn partial_matches_anywhere_in_name() {
        let index = sample();
        let searcher = Searcher::new(&index);
        assert_eq!(searcher.partial("B.T"), ["/z/ab.txt", "/y/B.txt"]);
        assert!(searcher.partial("zzz").is_empty());
    }

    #[test]
    fn directory_filters_split_partial_results() {
        let mut index = sample();
        index.insert("src", IndexedPath::dir("/repo/src"));
        index.insert("src.rs", IndexedPath::file("/repo/gen/src.rs"));
        let searcher = Searcher::new(&index);

        assert_eq!(searcher.directories("src"), ["/repo/src"]);
        assert_eq!(searcher.files_only("src"), ["/repo/gen/src.rs"]);
        assert!(searcher.exists("SRC"));
        assert!(!searcher.exists("lib"));
        assert_eq!(searcher.count(), 5);
    }

    #[test]
    fn all_records_keep_directory_flag_in_key_order() {
        let mut index = sample();
        index.insert("Docs", IndexedPath::dir("/repo/Docs"));
        let searcher = Searcher::new(&index);

        let records = searcher.all_records();
        let listed: Vec<(&str, bool)> = records.iter().map(|r| (r.path.as_str(), r.is_dir)).collect();
        assert_eq!(
            listed,
            [
                ("/x/a.txt", false),
                ("/z/ab.txt", false),
                ("/y/B.txt", false),
                ("/repo/Docs", true),
            ]
        );
        assert_eq!(searcher.all_entries().len(), records.len());
    }

    #[test]
    fn key_counts_reports_merged_entries() {
        let mut index = sample();
        index.insert("A.TXT", IndexedPath::file("/w/A.TXT"));
        let counts: Vec<(&str, usize)> = key_counts(&index).collect();
        assert_eq!(counts, [("a.txt", 2), ("ab.txt", 1), ("b.txt", 1)]);
    }
}
