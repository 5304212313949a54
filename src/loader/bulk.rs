//! Concurrent bulk loader: one producer, a fixed worker pool, batched locked inserts.
//!
//! ```text
//! producer ──► bounded channel ──► worker 1..N ──► Mutex<NameIndex>
//!                                     │
//!                                     └──► AtomicUsize counters
//! ```
//!
//! Each worker drains the channel into a local batch and takes the tree lock
//! once per full batch (and once more for its final partial batch after the
//! channel closes). The counters live outside the tree lock. When every
//! worker has been joined the mutex is consumed and the caller receives sole
//! ownership of the index, so queries can only start after loading is done.

#![allow(missing_docs)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::config::LoaderConfig;
use crate::core::errors::{FidxError, Result};
use crate::index::tree::DEFAULT_ORDER;
use crate::index::{IndexedPath, NameIndex};
use crate::loader::walker::{DirectoryWalker, FileRecord, WalkSummary, WalkerConfig};

/// Aggregate statistics of one load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// Records inserted into the tree.
    pub total_files: usize,
    /// Distinct lower-cased names in the finished tree.
    pub distinct_keys: usize,
    /// Locked batch insertions performed across all workers.
    pub batches: usize,
    /// Entries the walker could not read.
    pub skipped_entries: usize,
    pub workers: usize,
    pub batch_size: usize,
    /// Wall-clock time from call start to the last worker joining.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

/// A finished index together with the statistics of the load that built it.
#[derive(Debug)]
pub struct LoadOutcome {
    pub index: NameIndex,
    pub stats: LoadStats,
}

/// Builds a [`NameIndex`] from a record stream using a worker pool.
#[derive(Debug, Clone)]
pub struct BulkLoader {
    config: LoaderConfig,
    order: usize,
}

impl BulkLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            order: DEFAULT_ORDER,
        }
    }

    /// Use a non-default tree order for the index being built.
    #[must_use]
    pub const fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    /// Walk `root` with default walker settings and index everything found.
    pub fn load(&self, root: &Path) -> Result<LoadOutcome> {
        self.load_with_walker(&DirectoryWalker::new(WalkerConfig::for_root(root)))
    }

    /// Index everything `walker` produces. A missing root fails before any thread starts.
    pub fn load_with_walker(&self, walker: &DirectoryWalker) -> Result<LoadOutcome> {
        walker.check_root()?;
        self.run(|tx| walker.walk_into(tx))
    }

    /// Index an arbitrary record stream, e.g. synthetic records.
    pub fn load_records<I>(&self, records: I) -> Result<LoadOutcome>
    where
        I: IntoIterator<Item = FileRecord>,
        I::IntoIter: Send,
    {
        let records = records.into_iter();
        self.run(move |tx| {
            let mut summary = WalkSummary::default();
            for record in records {
                if record.is_dir {
                    summary.directories += 1;
                } else {
                    summary.files += 1;
                }
                if tx.send(record).is_err() {
                    summary.disconnected = true;
                    break;
                }
            }
            summary
        })
    }

    fn run<P>(&self, produce: P) -> Result<LoadOutcome>
    where
        P: FnOnce(&channel::Sender<FileRecord>) -> WalkSummary + Send,
    {
        self.validate()?;
        let start = Instant::now();
        let workers = self.config.workers;
        let batch_size = self.config.batch_size;

        let tree = Mutex::new(NameIndex::with_order(self.order)?);
        let inserted = AtomicUsize::new(0);
        let batches = AtomicUsize::new(0);
        let (tx, rx) = channel::bounded::<FileRecord>(self.config.channel_capacity);

        let summary = thread::scope(|scope| -> Result<WalkSummary> {
            let producer = scope.spawn(move || {
                // The sender is dropped when this closure returns, closing the channel.
                let tx = tx;
                produce(&tx)
            });

            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let rx = rx.clone();
                    let (tree, inserted, batches) = (&tree, &inserted, &batches);
                    scope.spawn(move || insert_worker(&rx, batch_size, tree, inserted, batches))
                })
                .collect();
            // Workers hold their own clones; ours must not keep the channel open.
            drop(rx);

            let summary = producer.join().map_err(|_| FidxError::Runtime {
                details: "record producer panicked".to_string(),
            })?;
            for handle in handles {
                handle.join().map_err(|_| FidxError::Runtime {
                    details: "insertion worker panicked".to_string(),
                })?;
            }
            Ok(summary)
        })?;

        let index = tree.into_inner();
        let total_files = inserted.into_inner();
        if total_files != index.value_count() {
            return Err(FidxError::invariant(format!(
                "counted {total_files} inserted records but tree stores {}",
                index.value_count()
            )));
        }

        let stats = LoadStats {
            total_files,
            distinct_keys: index.len(),
            batches: batches.into_inner(),
            skipped_entries: summary.skipped,
            workers,
            batch_size,
            elapsed: start.elapsed(),
        };
        Ok(LoadOutcome { index, stats })
    }

    fn validate(&self) -> Result<()> {
        if self.config.workers == 0 || self.config.batch_size == 0 {
            return Err(FidxError::InvalidConfig {
                details: format!(
                    "loader needs at least one worker and a batch size >= 1 (workers={}, batch_size={})",
                    self.config.workers, self.config.batch_size
                ),
            });
        }
        if self.config.channel_capacity == 0 {
            return Err(FidxError::InvalidConfig {
                details: "loader channel_capacity must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Drain the channel, flushing a batch under the tree lock whenever it fills.
fn insert_worker(
    rx: &channel::Receiver<FileRecord>,
    batch_size: usize,
    tree: &Mutex<NameIndex>,
    inserted: &AtomicUsize,
    batches: &AtomicUsize,
) {
    let mut batch = Vec::with_capacity(batch_size);
    for record in rx {
        batch.push(record);
        if batch.len() >= batch_size {
            flush(&mut batch, tree, inserted, batches);
        }
    }
    // Channel closed: the producer is done and the queue is drained.
    if !batch.is_empty() {
        flush(&mut batch, tree, inserted, batches);
    }
}

fn flush(
    batch: &mut Vec<FileRecord>,
    tree: &Mutex<NameIndex>,
    inserted: &AtomicUsize,
    batches: &AtomicUsize,
) {
    let count = batch.len();
    {
        let mut tree = tree.lock();
        for record in batch.drain(..) {
            let value = IndexedPath {
                path: record.path,
                is_dir: record.is_dir,
            };
            tree.insert(&record.name, value);
        }
    }
    inserted.fetch_add(count, Ordering::Relaxed);
    batches.fetch_add(1, Ordering::Relaxed);
}
