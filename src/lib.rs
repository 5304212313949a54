#![forbid(unsafe_code)]

//! fileindex (fidx): in-memory file-name index backed by a B+Tree.
//!
//! The index is rebuilt on every run:
//! 1. **Walker**: a single producer streams `(name, path)` records from a directory tree
//! 2. **Bulk loader**: a fixed worker pool drains a bounded channel and inserts in
//!    batches under one tree lock
//! 3. **Searcher**: exact, prefix and substring lookups over the finished tree,
//!    always in ascending name order
//!
//! # Library usage
//!
//! ```rust,no_run
//! use fileindex::prelude::*;
//!
//! let loader = BulkLoader::new(LoaderConfig::default());
//! let outcome = loader.load(std::path::Path::new("."))?;
//! let searcher = Searcher::new(&outcome.index);
//! for path in searcher.prefix("cargo") {
//!     println!("{path}");
//! }
//! # Ok::<(), FidxError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod index;
pub mod loader;
pub mod logger;
