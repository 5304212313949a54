//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use fileindex::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, LoaderConfig};
pub use crate::core::errors::{FidxError, Result};

// Index
pub use crate::index::searcher::Searcher;
pub use crate::index::tree::{BPlusTree, DEFAULT_ORDER, TreeShape};
pub use crate::index::{IndexedPath, NameIndex};

// Loader
pub use crate::loader::bulk::{BulkLoader, LoadOutcome, LoadStats};
pub use crate::loader::walker::{DirectoryWalker, FileRecord, WalkerConfig};
