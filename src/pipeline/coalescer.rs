//! Admission of raw filesystem callbacks into the per-path registry.

use std::path::{Path, PathBuf};
use tokio::time::Instant;
use tracing::{debug, info};

use super::event::{FileEvent, FileEventKind};
use super::registry::Registry;

/// Which raw events are worth queueing at all.
#[derive(Debug, Clone, Default)]
pub struct AdmissionFilter {
    /// Substrings that mark a path as noise (e.g. `.DS_Store`)
    pub ignore_markers: Vec<String>,
    /// Path prefixes that are never indexed (e.g. the index's own database)
    pub excluded_prefixes: Vec<PathBuf>,
}

impl AdmissionFilter {
    pub fn new(ignore_markers: Vec<String>) -> Self {
        Self {
            ignore_markers,
            excluded_prefixes: Vec::new(),
        }
    }

    pub fn exclude(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.excluded_prefixes.push(prefix.into());
        self
    }

    pub fn admits(&self, path: &Path, is_dir: bool) -> bool {
        if is_dir {
            return false;
        }

        let text = path.to_string_lossy();
        if self
            .ignore_markers
            .iter()
            .any(|marker| text.contains(marker.as_str()))
        {
            return false;
        }

        !self
            .excluded_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }
}

/// Producer side of the pipeline: turns watcher callbacks into queued events.
///
/// Holds no processing logic; the [`DebouncedIndexer`](super::DebouncedIndexer)
/// owns draining.
#[derive(Clone)]
pub struct EventCoalescer {
    registry: Registry,
    filter: AdmissionFilter,
}

impl EventCoalescer {
    pub fn new(registry: Registry, filter: AdmissionFilter) -> Self {
        Self { registry, filter }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Append an event unconditionally.
    pub fn enqueue(&self, path: PathBuf, kind: FileEventKind, observed_at: Instant) {
        debug!("Queued {} for {}", kind, path.display());
        self.registry.append(FileEvent::new(path, kind, observed_at));
    }

    /// Admit and enqueue a single event. Returns whether it was accepted.
    fn admit(&self, path: &Path, is_dir: bool, kind: FileEventKind, observed_at: Instant) -> bool {
        if !self.filter.admits(path, is_dir) {
            return false;
        }
        self.enqueue(path.to_path_buf(), kind, observed_at);
        true
    }

    pub fn on_created(&self, path: &Path, is_dir: bool) {
        if self.admit(path, is_dir, FileEventKind::Modification, Instant::now()) {
            info!("Detected creation: {}", path.display());
        }
    }

    pub fn on_modified(&self, path: &Path, is_dir: bool) {
        if self.admit(path, is_dir, FileEventKind::Modification, Instant::now()) {
            info!("Detected modification: {}", path.display());
        }
    }

    pub fn on_deleted(&self, path: &Path, is_dir: bool) {
        if self.admit(path, is_dir, FileEventKind::Deletion, Instant::now()) {
            info!("Detected deletion: {}", path.display());
        }
    }

    /// A rename is a deletion at `src` and a modification at `dest`, both
    /// stamped with the same instant. The deletion is queued first.
    pub fn on_moved(&self, src: &Path, dest: &Path, is_dir: bool) {
        let now = Instant::now();
        let removed = self.admit(src, is_dir, FileEventKind::Deletion, now);
        let added = self.admit(dest, is_dir, FileEventKind::Modification, now);
        if removed || added {
            info!("Detected move: {} -> {}", src.display(), dest.display());
        }
    }
}
