//! Event coalescing and debounced indexing.
//!
//! Raw filesystem callbacks are admitted by the [`EventCoalescer`] into a
//! per-path [`Registry`]. A single [`DebouncedIndexer`] task wakes on a fixed
//! cadence, drains every queue whose head has been quiet for the debounce
//! window, and applies the last drained kind through the [`Dispatcher`].
//! Bursts of edits to one file therefore cost one index update.

mod coalescer;
mod dispatch;
mod event;
mod indexer;
mod registry;
mod watcher;

pub use coalescer::{AdmissionFilter, EventCoalescer};
pub use dispatch::{DispatchError, DispatchOutcome, Dispatcher};
pub use event::{FileEvent, FileEventKind};
pub use indexer::{DebouncedIndexer, IndexerHandle, PassStats};
pub use registry::Registry;
pub use watcher::{FsWatcher, files_under, forward};

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Timing of the scan loop.
#[derive(Debug, Clone, Copy)]
pub struct PipelineTiming {
    pub debounce: Duration,
    pub scan_interval: Duration,
}

/// A running watcher plus its indexer loop.
pub struct Pipeline {
    watcher: FsWatcher,
    coalescer: EventCoalescer,
    indexer: IndexerHandle,
}

impl Pipeline {
    /// Start watching `root` and indexing through `dispatcher`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        root: &Path,
        filter: AdmissionFilter,
        dispatcher: Dispatcher,
        timing: PipelineTiming,
    ) -> Result<Self> {
        anyhow::ensure!(
            !timing.scan_interval.is_zero(),
            "scan interval must be greater than zero"
        );

        let indexed = dispatcher.indexes().clone();
        let registry = Registry::new();
        let coalescer = EventCoalescer::new(registry.clone(), filter);
        let indexer = DebouncedIndexer::new(
            registry,
            dispatcher,
            timing.debounce,
            timing.scan_interval,
        )
        .spawn();
        let watcher = FsWatcher::start(root, coalescer.clone(), indexed)?;

        Ok(Self {
            watcher,
            coalescer,
            indexer,
        })
    }

    pub fn root(&self) -> &Path {
        self.watcher.root()
    }

    pub fn pending_events(&self) -> usize {
        self.coalescer.registry().pending_events()
    }

    /// Stop watching, then stop the indexer and wait for it to exit.
    ///
    /// Events still inside the debounce window are dropped.
    pub async fn shutdown(self) -> Result<()> {
        let Pipeline {
            watcher,
            coalescer,
            indexer,
        } = self;
        drop(watcher);
        indexer.stop().await?;

        let dropped = coalescer.registry().pending_events();
        if dropped > 0 {
            info!("Discarded {} pending events on shutdown", dropped);
        }
        Ok(())
    }
}
