//! Name index: B+Tree engine, leaf chain, and the read-only search facade.

pub mod searcher;
pub mod tree;

use serde::Serialize;

/// One observed location of a file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedPath {
    /// Absolute path as reported by the walker.
    pub path: String,
    /// Whether the path names a directory.
    pub is_dir: bool,
}

impl IndexedPath {
    /// Record for a regular file.
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    /// Record for a directory.
    #[must_use]
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

/// The file-name index: lower-cased name → every path observed for it.
pub type NameIndex = tree::BPlusTree<IndexedPath>;
