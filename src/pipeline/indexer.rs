//! Consumer side of the pipeline: the debounced scan loop.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::dispatch::{DispatchOutcome, Dispatcher};
use super::registry::Registry;

/// Counters for one scan pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    /// Paths with an effective action this pass
    pub dispatched: usize,
    /// Of those, how many failed
    pub failed: usize,
}

/// Floor for the scan cadence; a zero period would spin.
const MIN_CADENCE: Duration = Duration::from_millis(1);

/// Periodically drains quiescent queues and applies one action per path.
#[derive(Clone)]
pub struct DebouncedIndexer {
    registry: Registry,
    dispatcher: Dispatcher,
    window: Duration,
    cadence: Duration,
}

impl DebouncedIndexer {
    pub fn new(
        registry: Registry,
        dispatcher: Dispatcher,
        window: Duration,
        cadence: Duration,
    ) -> Self {
        if cadence < MIN_CADENCE {
            warn!("Scan cadence {:?} too small, using {:?}", cadence, MIN_CADENCE);
        }
        let cadence = cadence.max(MIN_CADENCE);
        Self {
            registry,
            dispatcher,
            window,
            cadence,
        }
    }

    /// One pass over every path known at the start of the pass.
    ///
    /// For each path, events that have been quiet for the debounce window as
    /// of `now` are drained and the last one's kind is dispatched. A failed
    /// dispatch is logged and does not affect other paths.
    pub async fn scan_pass(&self, now: Instant) -> PassStats {
        let mut stats = PassStats::default();

        for path in self.registry.paths() {
            let Some(kind) = self.registry.drain_ready(&path, now, self.window) else {
                continue;
            };

            stats.dispatched += 1;
            debug!("Effective action for {}: {}", path.display(), kind);

            match self.dispatcher.dispatch(&path, kind).await {
                Ok(DispatchOutcome::Unsupported) | Ok(DispatchOutcome::AlreadyAbsent) => {}
                Ok(outcome) => debug!("Dispatched {}: {:?}", path.display(), outcome),
                Err(e) => {
                    stats.failed += 1;
                    error!("Failed to apply {} for {}: {}", kind, path.display(), e);
                }
            }
        }

        stats
    }

    /// Start the scan loop on the current tokio runtime.
    pub fn spawn(self) -> IndexerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        IndexerHandle { stop_tx, task }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        info!(
            "Indexer started (debounce {:?}, scan every {:?})",
            self.window, self.cadence
        );

        let mut ticker = tokio::time::interval(self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    // A dropped sender also means stop
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let stats = self.scan_pass(Instant::now()).await;
            if stats.dispatched > 0 {
                debug!(
                    "Scan pass: {} dispatched, {} failed, {} events pending",
                    stats.dispatched,
                    stats.failed,
                    self.registry.pending_events()
                );
            }

            if *stop_rx.borrow() {
                break;
            }
        }

        info!("Indexer stopped");
    }
}

/// Owner of a running scan loop.
pub struct IndexerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl IndexerHandle {
    /// Signal the loop to stop and wait for it to exit.
    ///
    /// A pass already in progress runs to completion first; no pass starts
    /// after this returns.
    pub async fn stop(self) -> anyhow::Result<()> {
        // Err only if the loop already exited and dropped its receiver
        let _ = self.stop_tx.send(true);
        self.task.await?;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
