//! Per-path event queues shared between the watcher callback and the indexer.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::event::{FileEvent, FileEventKind};

type Queues = HashMap<PathBuf, VecDeque<FileEvent>>;

/// Path → FIFO queue of pending events.
///
/// The producer only appends at the tail, the consumer only removes a prefix
/// from the head. A single coarse lock guards the map; it is held for the
/// duration of one append or one drain and never across an `.await`.
#[derive(Clone, Default)]
pub struct Registry {
    queues: Arc<Mutex<Queues>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means a panic happened mid-append or mid-drain;
    // both leave the deque in a valid state.
    fn lock(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event to its path's queue, creating the queue if needed.
    pub fn append(&self, event: FileEvent) {
        let mut queues = self.lock();
        queues.entry(event.path.clone()).or_default().push_back(event);
    }

    /// Snapshot of the paths that currently have a queue.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().keys().cloned().collect()
    }

    /// Drain every event at the head of `path`'s queue that has been quiet for
    /// at least `window` as of `now`, returning the kind of the last one drained.
    ///
    /// Returns `None` when the queue is missing, empty, or its head is still
    /// inside the window. A queue emptied by the drain is evicted.
    pub fn drain_ready(&self, path: &Path, now: Instant, window: Duration) -> Option<FileEventKind> {
        let mut queues = self.lock();
        let queue = queues.get_mut(path)?;

        let mut last = None;
        while let Some(head) = queue.front() {
            if now.saturating_duration_since(head.observed_at) < window {
                break;
            }
            last = queue.pop_front().map(|event| event.kind);
        }

        if queue.is_empty() {
            queues.remove(path);
        }

        last
    }

    /// Number of events waiting for `path`.
    pub fn pending_for(&self, path: &Path) -> usize {
        self.lock().get(path).map(VecDeque::len).unwrap_or(0)
    }

    /// Total number of events waiting across all paths.
    pub fn pending_events(&self) -> usize {
        self.lock().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(path: &str, kind: FileEventKind, at: Instant) -> FileEvent {
        FileEvent::new(PathBuf::from(path), kind, at)
    }

    #[test]
    fn test_append_keeps_fifo_order() {
        let registry = Registry::new();
        let t0 = Instant::now();
        registry.append(event("/a", FileEventKind::Modification, t0));
        registry.append(event("/a", FileEventKind::Deletion, t0 + Duration::from_secs(1)));
        registry.append(event("/b", FileEventKind::Modification, t0));

        assert_eq!(registry.pending_for(Path::new("/a")), 2);
        assert_eq!(registry.pending_for(Path::new("/b")), 1);
        assert_eq!(registry.pending_events(), 3);

        let mut paths = registry.paths();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_drain_stops_at_first_recent_event() {
        let registry = Registry::new();
        let t0 = Instant::now();
        let window = Duration::from_secs(5);
        registry.append(event("/a", FileEventKind::Modification, t0));
        registry.append(event("/a", FileEventKind::Deletion, t0 + Duration::from_secs(1)));
        registry.append(event("/a", FileEventKind::Modification, t0 + Duration::from_secs(4)));

        // At t=6 the first two are eligible, the third is not
        let kind = registry.drain_ready(Path::new("/a"), t0 + Duration::from_secs(6), window);
        assert_eq!(kind, Some(FileEventKind::Deletion));
        assert_eq!(registry.pending_for(Path::new("/a")), 1);
    }

    #[test]
    fn test_drain_nothing_before_window() {
        let registry = Registry::new();
        let t0 = Instant::now();
        let window = Duration::from_secs(5);
        registry.append(event("/a", FileEventKind::Modification, t0));

        for secs in [0, 2, 4] {
            let now = t0 + Duration::from_secs(secs);
            assert_eq!(registry.drain_ready(Path::new("/a"), now, window), None);
        }
        assert_eq!(registry.pending_for(Path::new("/a")), 1);
    }

    #[test]
    fn test_drain_at_exact_window_boundary() {
        let registry = Registry::new();
        let t0 = Instant::now();
        registry.append(event("/a", FileEventKind::Modification, t0));

        let kind = registry.drain_ready(
            Path::new("/a"),
            t0 + Duration::from_secs(5),
            Duration::from_secs(5),
        );
        assert_eq!(kind, Some(FileEventKind::Modification));
    }

    #[test]
    fn test_fully_drained_queue_is_evicted() {
        let registry = Registry::new();
        let t0 = Instant::now();
        registry.append(event("/a", FileEventKind::Deletion, t0));

        registry.drain_ready(Path::new("/a"), t0 + Duration::from_secs(10), Duration::from_secs(5));
        assert!(registry.is_empty());
        assert_eq!(
            registry.drain_ready(Path::new("/a"), t0 + Duration::from_secs(20), Duration::from_secs(5)),
            None
        );
    }

    #[test]
    fn test_append_after_drain_recreates_queue() {
        let registry = Registry::new();
        let t0 = Instant::now();
        let window = Duration::from_secs(5);
        registry.append(event("/a", FileEventKind::Modification, t0));
        registry.drain_ready(Path::new("/a"), t0 + Duration::from_secs(5), window);

        registry.append(event("/a", FileEventKind::Deletion, t0 + Duration::from_secs(6)));
        assert_eq!(registry.pending_for(Path::new("/a")), 1);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let registry = Registry::new();
        let t0 = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.append(event(
                            &format!("/file-{}", i),
                            FileEventKind::Modification,
                            t0,
                        ));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.pending_events(), 400);
    }
}
